use std::fs;

use assert_matches::assert_matches;

use amplicon_pipeline::config::{
    Config, ConfigLoader, DenoiseEntry, DenoiseParams, DiversityEntry,
};
use amplicon_pipeline::error::PipelineError;
use amplicon_pipeline::naming::NamingScheme;

#[test]
fn resolve_config_applies_overrides() {
    let config = Config {
        schema_version: None,
        naming: Some(NamingScheme::LeadingToken),
        qiime: Some("/opt/qiime2/bin/qiime".into()),
        threads: Some(4),
        denoise: DenoiseEntry {
            trunc_len_r: Some(240),
            ..DenoiseEntry::default()
        },
        diversity: DiversityEntry {
            sampling_depth: Some(5000),
            beta_group_column: Some("Site".to_string()),
            ..DiversityEntry::default()
        },
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.naming, NamingScheme::LeadingToken);
    assert_eq!(resolved.threads, 4);
    assert_eq!(resolved.denoise.trim_left_f, 10);
    assert_eq!(resolved.denoise.trunc_len_r, 240);
    assert_eq!(resolved.diversity.sampling_depth, 5000);
    assert_eq!(resolved.diversity.max_depth, 4000);
    assert_eq!(resolved.diversity.beta_group_column, "Site");
}

#[test]
fn resolve_reads_json_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ampliconpipeline.json");
    fs::write(
        &path,
        r#"{ "schema_version": 1, "naming": "olc", "denoise": { "chimera_method": "pooled" } }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.naming, NamingScheme::Olc);
    assert_eq!(resolved.denoise.chimera_method, "pooled");
    assert_eq!(resolved.denoise.trunc_len_r, DenoiseParams::default().trunc_len_r);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(PipelineError::ConfigRead(_))
    );
}

#[test]
fn invalid_values_are_rejected() {
    let zero_threads = Config {
        threads: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_threads),
        Err(PipelineError::ConfigParse(_))
    );

    let chimera = Config {
        denoise: DenoiseEntry {
            chimera_method: Some("uchime".to_string()),
            ..DenoiseEntry::default()
        },
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(chimera),
        Err(PipelineError::ConfigParse(_))
    );
}
