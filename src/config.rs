/// Which synthesis prompt revision the editorial LLM path should request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPromptVersion {
    V1,
    V2,
}

impl std::str::FromStr for SynthesisPromptVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(SynthesisPromptVersion::V1),
            "v2" => Ok(SynthesisPromptVersion::V2),
            _ => Err(()),
        }
    }
}

/// Feature flags consumed by the synthesis stage (spec.md §6). Read once at
/// construction, the way `digest_mailer.rs` reads `EMAIL_FROM` once in its
/// `new()` rather than re-reading the environment on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestConfig {
    pub llm_synthesis: bool,
    pub raw_digest: bool,
    pub synthesis_prompt: SynthesisPromptVersion,
    pub debug_featured: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            llm_synthesis: true,
            raw_digest: false,
            synthesis_prompt: SynthesisPromptVersion::V2,
            debug_featured: false,
        }
    }
}

impl DigestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_synthesis: env_flag("MAILQ_LLM_SYNTHESIS", defaults.llm_synthesis),
            raw_digest: env_flag("MAILQ_RAW_DIGEST", defaults.raw_digest),
            synthesis_prompt: std::env::var("MAILQ_SYNTHESIS_PROMPT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.synthesis_prompt),
            debug_featured: env_flag("DEBUG_FEATURED", defaults.debug_featured),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "off" | "no"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = DigestConfig::default();
        assert!(cfg.llm_synthesis);
        assert!(!cfg.raw_digest);
        assert_eq!(cfg.synthesis_prompt, SynthesisPromptVersion::V2);
        assert!(!cfg.debug_featured);
    }
}
