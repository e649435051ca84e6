use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use super::*;

fn v(input: &str) -> Version {
    Version::parse(input).expect("test version must parse")
}

#[test]
fn compare_orders_numeric_components_numerically() {
    assert_eq!(compare(&v("2.0.0"), &v("1.0.0")), Ordering::Greater);
    assert_eq!(compare(&v("1.10.0"), &v("1.9.0")), Ordering::Greater);
    assert_eq!(compare(&v("1.0.9"), &v("1.0.10")), Ordering::Less);
}

#[test]
fn compare_prefers_release_over_pre_release() {
    assert_eq!(compare(&v("1.0.0"), &v("1.0.0-beta")), Ordering::Greater);
    assert_eq!(compare(&v("1.0.0-rc1"), &v("1.0.0")), Ordering::Less);
    assert!(v("1.0.1-alpha").is_newer_than(&v("1.0.0")));
}

#[test]
fn compare_ignores_leading_v() {
    assert_eq!(compare(&v("v1.0.0"), &v("1.0.0")), Ordering::Equal);
    assert_eq!(v("v1.0.0"), v("1.0.0"));
}

#[test]
fn pre_release_labels_compare_bytewise() {
    // Lexical, not numeric-aware: "10" sorts before "9".
    assert_eq!(
        compare(&v("1.0.0-beta.10"), &v("1.0.0-beta.9")),
        Ordering::Less
    );
    assert_eq!(compare(&v("1.0.0-Beta"), &v("1.0.0-alpha")), Ordering::Less);
    assert_eq!(compare(&v("1.0.0-rc.1"), &v("1.0.0-rc.1")), Ordering::Equal);
}

#[test]
fn compare_is_a_total_order_over_sample_grid() {
    let samples = [
        "0.0.0", "0.0.1", "0.1.0", "1.0.0-alpha", "1.0.0-beta", "1.0.0-beta.2", "1.0.0",
        "1.0.1", "1.2.0", "1.10.0", "2.0.0-rc1", "2.0.0", "10.0.0",
    ]
    .map(v);

    for a in &samples {
        for b in &samples {
            let ab = compare(a, b);
            assert_eq!(ab, compare(b, a).reverse(), "antisymmetry for {a} vs {b}");
            assert_eq!(ab == Ordering::Equal, a == b);
            assert_eq!(a.is_newer_than(b), ab == Ordering::Greater);
            assert_eq!(a.is_older_than(b), ab == Ordering::Less);
            for c in &samples {
                if ab != Ordering::Greater && compare(b, c) != Ordering::Greater {
                    assert_ne!(compare(a, c), Ordering::Greater, "transitivity {a} {b} {c}");
                }
            }
        }
    }
}

#[test]
fn normalize_pads_and_strips_prefix() {
    assert_eq!(normalize("1").expect("normalize"), "1.0.0");
    assert_eq!(normalize("v1.2").expect("normalize"), "1.2.0");
    assert_eq!(normalize("v1.2.3-rc.1").expect("normalize"), "1.2.3-rc.1");
    assert_eq!(normalize("3.4-beta").expect("normalize"), "3.4.0-beta");
}

#[test]
fn normalize_is_idempotent() {
    for input in ["1", "v1.2", "1.2.3", "v0.0.7-alpha.3", "12.0"] {
        let once = normalize(input).expect("first normalize");
        let twice = normalize(&once).expect("second normalize");
        assert_eq!(once, twice, "normalize must be idempotent for {input}");
        assert!(Version::parse(&once).is_ok());
    }
}

#[test]
fn parse_rejects_malformed_versions() {
    for input in [
        "",
        "1",
        "1.2",
        "1.2.3.4",
        "1.x.3",
        "1..3",
        "1.2.3-",
        "1.2.3-beta_1",
        "1.2.3-beta-1",
        "V1.2.3",
        " 1.2.3",
        "99999999999999999999.0.0",
    ] {
        let err = Version::parse(input).expect_err("malformed version must be rejected");
        assert!(
            matches!(err, VersionError::InvalidFormat { .. }),
            "unexpected error for {input:?}: {err:?}"
        );
    }
}

#[test]
fn parse_loose_accepts_short_tags() {
    assert_eq!(Version::parse_loose("v2").expect("loose parse"), v("2.0.0"));
    assert_eq!(Version::parse_loose("2.1").expect("loose parse"), v("2.1.0"));
    assert!(Version::parse_loose("two").is_err());
}

#[test]
fn version_display_and_tag_are_canonical() {
    let version = v("v1.4.2-rc.2");
    assert_eq!(version.to_string(), "1.4.2-rc.2");
    assert_eq!(version.tag(), "v1.4.2-rc.2");
    assert_eq!(version.pre_release(), Some("rc.2"));
    assert_eq!((version.major(), version.minor(), version.patch()), (1, 4, 2));
}

#[test]
fn parse_release_manifest() {
    let content = r#"
version = "1.2.0"
artifact = "memoria-1.2.0.tar.gz"
sha256 = "9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08"
source_revision = "4d2c1e0"
"#;

    let manifest = ReleaseManifest::from_toml_str(content).expect("manifest should parse");
    assert_eq!(manifest.version, v("1.2.0"));
    assert_eq!(manifest.artifact, "memoria-1.2.0.tar.gz");
    assert_eq!(manifest.source_revision.as_deref(), Some("4d2c1e0"));
    assert!(manifest.signature.is_none());
    assert_eq!(
        manifest.signed_payload(),
        "1.2.0\nmemoria-1.2.0.tar.gz\n9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08\n"
    );
}

#[test]
fn release_manifest_rejects_invalid_version_and_paths() {
    let bad_version = r#"
version = "1.2"
artifact = "memoria.tar.gz"
sha256 = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
"#;
    assert!(ReleaseManifest::from_toml_str(bad_version).is_err());

    let traversal = r#"
version = "1.2.0"
artifact = "../memoria.tar.gz"
sha256 = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
"#;
    assert!(ReleaseManifest::from_toml_str(traversal).is_err());

    let short_digest = r#"
version = "1.2.0"
artifact = "memoria.tar.gz"
sha256 = "abc123"
"#;
    assert!(ReleaseManifest::from_toml_str(short_digest).is_err());
}

#[test]
fn config_defaults_apply_for_missing_sections() {
    let config = InstallConfig::from_toml_str(
        "/opt/memoria",
        r#"
[container]
host_port = 9100
"#,
    )
    .expect("partial config must parse");

    assert_eq!(config.install_root, PathBuf::from("/opt/memoria"));
    assert_eq!(config.container.host_port, 9100);
    assert_eq!(config.container.container_port, 8000);
    assert_eq!(config.container.name, "memoria-chroma");
    assert_eq!(config.release.base_url, DEFAULT_RELEASE_URL);
    assert_eq!(config.timeouts.network().as_secs(), 30);
    assert_eq!(config.dependencies.steps.len(), 2);
}

#[test]
fn config_rejects_unknown_fields_and_zero_timeouts() {
    assert!(InstallConfig::from_toml_str("/opt/memoria", "colour = \"blue\"\n").is_err());
    assert!(InstallConfig::from_toml_str(
        "/opt/memoria",
        "[timeouts]\nnetwork_secs = 0\n"
    )
    .is_err());
}

#[test]
fn config_load_falls_back_to_defaults_when_file_missing() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = InstallConfig::load(dir.path(), None).expect("missing default config is fine");
    assert_eq!(config, InstallConfig::with_root(dir.path()));

    let explicit = dir.path().join("absent.toml");
    assert!(InstallConfig::load(dir.path(), Some(&explicit)).is_err());
}

#[test]
fn command_step_substitutes_placeholders() {
    let step = CommandStep::new("{env}/bin/python", &["-m", "memoria", "--data", "{root}/data", "{payload}"]);
    let (program, args) = step.resolve(StepPaths {
        root: Path::new("/home/op/.memoria"),
        payload: Path::new("/home/op/.memoria/app"),
        env: Path::new("/home/op/.memoria/env"),
    });
    assert_eq!(program, "/home/op/.memoria/env/bin/python");
    assert_eq!(
        args,
        vec![
            "-m",
            "memoria",
            "--data",
            "/home/op/.memoria/data",
            "/home/op/.memoria/app"
        ]
    );
}

#[test]
fn only_rollback_failures_are_fatal() {
    let rollback = Error::Rollback {
        backup: PathBuf::from("/tmp/backup"),
        apply_cause: "health gate failed".to_string(),
        source: anyhow::anyhow!("rename failed"),
    };
    assert!(rollback.is_fatal());
    assert!(!Error::integrity("memoria.tar.gz", "sha256 mismatch").is_fatal());
    assert!(!Error::from(Version::parse("1").expect_err("invalid")).is_fatal());
}
