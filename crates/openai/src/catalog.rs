//! Static model catalogs per preset.
//!
//! Prices are USD per token, converted from the vendors' per-million list
//! prices. Models a vendor lists but this table does not know are priced at
//! zero.

use qcore::ModelInfo;

const PER_MILLION: f64 = 1_000_000.0;

/// `(id, name, context length, input $/M, output $/M)`
type Entry = (&'static str, &'static str, usize, f64, f64);

const OPENAI: &[Entry] = &[
    ("gpt-4o", "GPT-4o", 128_000, 2.50, 10.00),
    ("gpt-4o-mini", "GPT-4o mini", 128_000, 0.15, 0.60),
    ("gpt-4.1", "GPT-4.1", 1_047_576, 2.00, 8.00),
    ("gpt-4.1-mini", "GPT-4.1 mini", 1_047_576, 0.40, 1.60),
    ("o3-mini", "o3-mini", 200_000, 1.10, 4.40),
];

const GROQ: &[Entry] = &[
    ("llama-3.3-70b-versatile", "Llama 3.3 70B", 131_072, 0.59, 0.79),
    ("llama-3.1-8b-instant", "Llama 3.1 8B", 131_072, 0.05, 0.08),
    ("gemma2-9b-it", "Gemma 2 9B", 8_192, 0.20, 0.20),
];

const OPENROUTER: &[Entry] = &[
    ("openai/gpt-4o", "OpenAI: GPT-4o", 128_000, 2.50, 10.00),
    ("openai/gpt-4o-mini", "OpenAI: GPT-4o mini", 128_000, 0.15, 0.60),
    ("anthropic/claude-3.5-sonnet", "Anthropic: Claude 3.5 Sonnet", 200_000, 3.00, 15.00),
    ("meta-llama/llama-3.1-70b-instruct", "Meta: Llama 3.1 70B", 131_072, 0.12, 0.30),
];

/// The built-in catalog for a preset id. Unknown ids have none.
pub fn catalog(preset: &str) -> Vec<ModelInfo> {
    let entries = match preset {
        "openai" => OPENAI,
        "groq" => GROQ,
        "openrouter" => OPENROUTER,
        _ => &[],
    };
    entries
        .iter()
        .map(|&(id, name, context, input, output)| {
            ModelInfo::remote(id, name, context, input / PER_MILLION, output / PER_MILLION)
        })
        .collect()
}
