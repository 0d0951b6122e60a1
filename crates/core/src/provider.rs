/// Credential variable accepted by every provider when its own is unset.
pub const SHARED_KEY_ENV_VAR: &str = "API_KEY";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Gemini,
    Openai,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/models",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-4o-mini",
                env_var: "OPENAI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Openai => "OpenAI",
        }
    }

    /// Find the API key for this provider through `lookup`, falling back to
    /// the shared `API_KEY` variable. Blank values count as missing.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        [self.config().env_var, SHARED_KEY_ENV_VAR]
            .into_iter()
            .filter_map(|var| lookup(var))
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefers_provider_specific_key() {
        let vars = env(&[("GEMINI_API_KEY", "gem"), ("API_KEY", "shared")]);
        let key = Provider::Gemini.resolve_api_key(|k| vars.get(k).cloned());
        assert_eq!(key.as_deref(), Some("gem"));
    }

    #[test]
    fn falls_back_to_shared_key() {
        let vars = env(&[("API_KEY", "shared")]);
        let key = Provider::Openai.resolve_api_key(|k| vars.get(k).cloned());
        assert_eq!(key.as_deref(), Some("shared"));
    }

    #[test]
    fn blank_keys_are_missing() {
        let vars = env(&[("GEMINI_API_KEY", "   "), ("API_KEY", "")]);
        assert!(
            Provider::Gemini
                .resolve_api_key(|k| vars.get(k).cloned())
                .is_none()
        );
    }
}
