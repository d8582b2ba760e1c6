use std::collections::BTreeMap;

/// Case-insensitive substring matcher over the configured refusal
/// signatures. Disabled phrases stay in the config file but do not match.
#[derive(Debug, Clone)]
pub struct RefusalPolicy {
    signatures: Vec<String>,
}

impl RefusalPolicy {
    pub fn from_signatures(signatures: &BTreeMap<String, bool>) -> Self {
        let signatures = signatures
            .iter()
            .filter(|(phrase, enabled)| **enabled && !phrase.trim().is_empty())
            .map(|(phrase, _)| phrase.to_lowercase())
            .collect();
        Self { signatures }
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// First configured signature contained in `output`, if any.
    pub fn matched_signature(&self, output: &str) -> Option<&str> {
        let lowered = output.to_lowercase();
        self.signatures
            .iter()
            .find(|signature| lowered.contains(signature.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(entries: &[(&str, bool)]) -> RefusalPolicy {
        let map: BTreeMap<String, bool> = entries
            .iter()
            .map(|(phrase, enabled)| (phrase.to_string(), *enabled))
            .collect();
        RefusalPolicy::from_signatures(&map)
    }

    #[test]
    fn matching_is_case_insensitive_substring_containment() {
        let policy = policy(&[("i cannot assist", true)]);
        assert_eq!(
            policy.matched_signature("Sorry, I CANNOT ASSIST with that request."),
            Some("i cannot assist")
        );
        assert_eq!(policy.matched_signature("happy to help"), None);
    }

    #[test]
    fn disabled_signatures_never_match() {
        let policy = policy(&[("terms of service", false), ("against my guidelines", true)]);
        assert_eq!(policy.matched_signature("this violates the Terms of Service"), None);
        assert_eq!(
            policy.matched_signature("that is Against My Guidelines."),
            Some("against my guidelines")
        );
    }

    #[test]
    fn default_settings_classify_common_refusals() {
        let settings = crate::config::RefusalSettings::default();
        let policy = RefusalPolicy::from_signatures(&settings.signatures);
        assert!(!policy.is_empty());
        assert!(policy
            .matched_signature("I cannot assist with that request")
            .is_some());
        assert!(policy
            .matched_signature("I can't help with writing malware")
            .is_some());
        assert!(policy.matched_signature("Done. The script is saved.").is_none());
    }
}
