//! Per-provider cost functions.

use crate::llm::Usage;

/// Price per token for each accounted bucket, in USD. `cache_read` is
/// typically ~10% of `input`; `cache_creation` is typically ~125% of
/// `input` (Anthropic's published ratios), reused as a default for
/// providers that don't document their own cache economics.
#[derive(Clone, Copy, Debug)]
pub struct Cost {
    input_per_token: f64,
    output_per_token: f64,
    cache_read_per_token: f64,
    cache_creation_per_token: f64,
}

impl Cost {
    pub fn compute(&self, usage: &Usage) -> f64 {
        usage.input as f64 * self.input_per_token
            + usage.output as f64 * self.output_per_token
            + usage.cache_read as f64 * self.cache_read_per_token
            + usage.cache_creation as f64 * self.cache_creation_per_token
    }

    pub fn anthropic() -> Self {
        // Approximate Claude Sonnet-tier pricing per token.
        Self {
            input_per_token: 3.0 / 1_000_000.0,
            output_per_token: 15.0 / 1_000_000.0,
            cache_read_per_token: 0.3 / 1_000_000.0,
            cache_creation_per_token: 3.75 / 1_000_000.0,
        }
    }

    pub fn bedrock() -> Self {
        Self::anthropic()
    }

    pub fn openai() -> Self {
        Self {
            input_per_token: 2.5 / 1_000_000.0,
            output_per_token: 10.0 / 1_000_000.0,
            cache_read_per_token: 1.25 / 1_000_000.0,
            cache_creation_per_token: 0.0,
        }
    }

    pub fn azure_openai() -> Self {
        Self::openai()
    }

    pub fn gemini() -> Self {
        Self {
            input_per_token: 1.25 / 1_000_000.0,
            output_per_token: 5.0 / 1_000_000.0,
            cache_read_per_token: 0.3125 / 1_000_000.0,
            cache_creation_per_token: 0.0,
        }
    }

    pub fn mistral() -> Self {
        Self {
            input_per_token: 2.0 / 1_000_000.0,
            output_per_token: 6.0 / 1_000_000.0,
            cache_read_per_token: 0.0,
            cache_creation_per_token: 0.0,
        }
    }

    pub fn ollama() -> Self {
        // Local inference: no metered cost.
        Self {
            input_per_token: 0.0,
            output_per_token: 0.0,
            cache_read_per_token: 0.0,
            cache_creation_per_token: 0.0,
        }
    }

    pub fn huggingface() -> Self {
        Self {
            input_per_token: 0.5 / 1_000_000.0,
            output_per_token: 1.0 / 1_000_000.0,
            cache_read_per_token: 0.0,
            cache_creation_per_token: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_is_free() {
        let usage = Usage {
            input: 1000,
            output: 1000,
            ..Default::default()
        };
        assert_eq!(Cost::ollama().compute(&usage), 0.0);
    }

    #[test]
    fn anthropic_charges_cache_read_less_than_input() {
        let cost = Cost::anthropic();
        let usage_input = Usage {
            input: 1000,
            ..Default::default()
        };
        let usage_cache = Usage {
            cache_read: 1000,
            ..Default::default()
        };
        assert!(cost.compute(&usage_cache) < cost.compute(&usage_input));
    }
}
