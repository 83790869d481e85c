#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert_eq!(config.batch.concurrency, 3);
        assert_eq!(config.batch.max_records, 0);
        assert_eq!(config.batch.abstract_chars, 2000);
        assert_eq!(config.jobs.max_retained, 0);
        assert_eq!(config.jobs.max_record_sets, 32);
        assert_eq!(config.llm.mode, "cli");
        assert_eq!(config.llm.cli.binary, "claude");
        assert_eq!(config.storage.data_dir, "~/.agentflow");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config = Config::from_toml(
            r#"
            [batch]
            concurrency = 8

            [jobs]
            max_retained = 10

            [llm]
            mode = "ollama"
            [llm.ollama]
            base_url = "http://gpu-box:11434"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch.concurrency, 8);
        assert_eq!(config.batch.abstract_chars, 2000);
        assert_eq!((config.jobs.max_retained, config.jobs.max_record_sets), (10, 32));
        assert_eq!(config.llm.default_model, "sonnet");
        assert_eq!(config.llm.ollama.base_url, "http://gpu-box:11434");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AGENTFLOW_BIND", "0.0.0.0:8080"),
            ("AGENTFLOW_ANTHROPIC_API_KEY", "sk-test"),
            ("AGENTFLOW_DATA_DIR", "  "),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.llm.anthropic.api_key, "sk-test");
        assert_eq!(config.storage.data_dir, "~/.agentflow");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.mode = "carrier_pigeon".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("carrier_pigeon"));

        let mut config = Config::default();
        config.llm.mode = "anthropic".to_string();
        assert!(config.validate().is_err());
        config.llm.anthropic.api_key = "sk".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_from_path_reports_file_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentflow.toml");
        std::fs::write(&path, "[batch\nconcurrency = ").unwrap();
        let err = Config::from_path(&path).unwrap_err().to_string();
        assert!(err.contains("agentflow.toml"), "{err}");
    }
}
