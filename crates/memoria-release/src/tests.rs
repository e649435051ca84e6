use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

use ed25519_dalek::{Signer, SigningKey};
use memoria_core::{Error, Version};
use memoria_security::sha256_hex;

use super::*;

const PAYLOAD: &[u8] = b"memoria 1.2.0 release payload";

fn v(input: &str) -> Version {
    Version::parse(input).expect("test version must parse")
}

fn manifest_toml(version: &str, artifact: &str, sha256: &str, signature: Option<&str>) -> String {
    let mut raw = format!(
        "version = \"{version}\"\nartifact = \"{artifact}\"\nsha256 = \"{sha256}\"\nsource_revision = \"abc1234\"\n"
    );
    if let Some(signature) = signature {
        raw.push_str(&format!("signature = \"{signature}\"\n"));
    }
    raw
}

struct Route {
    status: u16,
    body: Vec<u8>,
    declared_length: Option<usize>,
}

impl Route {
    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_length: None,
        }
    }

    fn truncated(body: impl Into<Vec<u8>>, declared_length: usize) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_length: Some(declared_length),
        }
    }
}

/// Serves `expected_requests` connections, one request each, then exits.
fn start_release_server(
    routes: Vec<(&str, Route)>,
    expected_requests: usize,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind release test server");
    let address = listener
        .local_addr()
        .expect("must read release test server address");
    let mut routes = routes
        .into_iter()
        .map(|(path, route)| (path.to_string(), route))
        .collect::<HashMap<_, _>>();

    let handle = std::thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..expected_requests {
            let (mut stream, _) = listener.accept().expect("must accept test client");
            let mut request = Vec::new();
            let mut buffer = [0_u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buffer).expect("must read request");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
            }
            let request = String::from_utf8_lossy(&request);
            let path = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/")
                .to_string();
            seen.push(path.clone());

            let route = routes.remove(&path).unwrap_or(Route {
                status: 404,
                body: b"not found".to_vec(),
                declared_length: None,
            });
            let reason = if route.status == 200 { "OK" } else { "Not Found" };
            let length = route.declared_length.unwrap_or(route.body.len());
            let headers = format!(
                "HTTP/1.1 {} {reason}\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n",
                route.status
            );
            stream
                .write_all(headers.as_bytes())
                .expect("must write test response headers");
            stream
                .write_all(&route.body)
                .expect("must write test response body");
            stream.flush().expect("must flush test response");
        }
        seen
    });

    (format!("http://{address}/releases"), handle)
}

fn retriever_for(base_url: &str) -> Retriever {
    Retriever::new(ReleaseSource {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        allow_insecure_http: true,
        trusted_public_key: None,
    })
    .expect("retriever must build")
}

#[test]
fn urls_are_addressed_by_version_tag() {
    let retriever = retriever_for("https://example.test/memoria/releases/");
    let version = v("1.2.0");
    assert_eq!(
        retriever.manifest_url(&version),
        "https://example.test/memoria/releases/download/v1.2.0/release.toml"
    );
    assert_eq!(
        retriever.artifact_url(&version, "memoria-1.2.0.tar.gz"),
        "https://example.test/memoria/releases/download/v1.2.0/memoria-1.2.0.tar.gz"
    );
    assert_eq!(
        retriever.latest_manifest_url(),
        "https://example.test/memoria/releases/latest/download/release.toml"
    );
}

#[test]
fn plain_http_is_refused_unless_explicitly_allowed() {
    let err = Retriever::new(ReleaseSource {
        base_url: "http://example.test/releases".to_string(),
        timeout: Duration::from_secs(1),
        allow_insecure_http: false,
        trusted_public_key: None,
    })
    .expect_err("http must be refused by default");
    assert!(err.to_string().contains("must use https"), "unexpected: {err}");
}

#[test]
fn fetch_verified_returns_artifact_with_matching_digest() {
    let digest = sha256_hex(PAYLOAD).to_ascii_uppercase();
    let (base_url, server) = start_release_server(
        vec![
            (
                "/releases/download/v1.2.0/release.toml",
                Route::ok(manifest_toml("1.2.0", "memoria-1.2.0.tar.gz", &digest, None)),
            ),
            (
                "/releases/download/v1.2.0/memoria-1.2.0.tar.gz",
                Route::ok(PAYLOAD),
            ),
        ],
        2,
    );

    let mut observed = Vec::new();
    let artifact = retriever_for(&base_url)
        .fetch_verified_with_progress(&v("1.2.0"), |downloaded, total| {
            observed.push((downloaded, total));
        })
        .expect("fetch must succeed");
    let seen = server.join().expect("server thread must join");

    assert_eq!(artifact.version(), &v("1.2.0"));
    assert_eq!(artifact.bytes(), PAYLOAD);
    assert_eq!(artifact.file_name(), "memoria-1.2.0.tar.gz");
    assert_eq!(
        artifact.manifest().source_revision.as_deref(),
        Some("abc1234")
    );
    assert_eq!(seen.len(), 2);
    let last = observed.last().expect("progress must be reported");
    assert_eq!(last.0, PAYLOAD.len() as u64);
    assert_eq!(last.1, Some(PAYLOAD.len() as u64));
}

#[test]
fn fetch_verified_rejects_corrupted_artifact() {
    let digest = sha256_hex(PAYLOAD);
    let mut corrupted = PAYLOAD.to_vec();
    corrupted[0] ^= 0xff;
    let (base_url, server) = start_release_server(
        vec![
            (
                "/releases/download/v1.2.0/release.toml",
                Route::ok(manifest_toml("1.2.0", "memoria-1.2.0.tar.gz", &digest, None)),
            ),
            (
                "/releases/download/v1.2.0/memoria-1.2.0.tar.gz",
                Route::ok(corrupted),
            ),
        ],
        2,
    );

    let err = retriever_for(&base_url)
        .fetch_verified(&v("1.2.0"))
        .expect_err("corrupted artifact must fail verification");
    server.join().expect("server thread must join");

    assert!(matches!(err, Error::Integrity { .. }), "unexpected: {err:?}");
}

#[test]
fn unverified_fetch_still_exposes_raw_bytes_for_manual_verify() {
    let digest = sha256_hex(b"something else");
    let (base_url, server) = start_release_server(
        vec![
            (
                "/releases/download/v1.2.0/release.toml",
                Route::ok(manifest_toml("1.2.0", "memoria.tar.gz", &digest, None)),
            ),
            ("/releases/download/v1.2.0/memoria.tar.gz", Route::ok(PAYLOAD)),
        ],
        2,
    );

    let fetched = retriever_for(&base_url)
        .fetch(&v("1.2.0"))
        .expect("raw fetch must succeed");
    server.join().expect("server thread must join");

    assert_eq!(fetched.bytes, PAYLOAD);
    assert!(matches!(
        verify(&fetched.bytes, &fetched.manifest.sha256),
        Verification::Mismatch { .. }
    ));
    assert!(VerifiedArtifact::verify(fetched.manifest, fetched.bytes).is_err());
}

#[test]
fn manifest_for_other_version_is_an_integrity_error() {
    let digest = sha256_hex(PAYLOAD);
    let (base_url, server) = start_release_server(
        vec![(
            "/releases/download/v1.2.0/release.toml",
            Route::ok(manifest_toml("1.1.0", "memoria.tar.gz", &digest, None)),
        )],
        1,
    );

    let err = retriever_for(&base_url)
        .fetch(&v("1.2.0"))
        .expect_err("mismatched manifest version must fail");
    server.join().expect("server thread must join");

    assert!(matches!(err, Error::Integrity { .. }), "unexpected: {err:?}");
}

#[test]
fn missing_release_is_a_network_error() {
    let (base_url, server) = start_release_server(Vec::new(), 1);

    let err = retriever_for(&base_url)
        .fetch(&v("9.9.9"))
        .expect_err("404 must fail");
    server.join().expect("server thread must join");

    assert!(matches!(err, Error::Network { .. }), "unexpected: {err:?}");
}

#[test]
fn refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let address = listener.local_addr().expect("must read address");
    drop(listener);

    let err = retriever_for(&format!("http://{address}/releases"))
        .fetch_latest_version()
        .expect_err("closed port must fail");
    assert!(matches!(err, Error::Network { .. }), "unexpected: {err:?}");
}

#[test]
fn truncated_transfer_is_a_network_error() {
    let digest = sha256_hex(PAYLOAD);
    let (base_url, server) = start_release_server(
        vec![
            (
                "/releases/download/v1.2.0/release.toml",
                Route::ok(manifest_toml("1.2.0", "memoria.tar.gz", &digest, None)),
            ),
            (
                "/releases/download/v1.2.0/memoria.tar.gz",
                Route::truncated(&PAYLOAD[..8], PAYLOAD.len()),
            ),
        ],
        2,
    );

    let err = retriever_for(&base_url)
        .fetch_verified(&v("1.2.0"))
        .expect_err("truncated body must fail");
    server.join().expect("server thread must join");

    assert!(matches!(err, Error::Network { .. }), "unexpected: {err:?}");
}

#[test]
fn fetch_latest_version_reads_latest_manifest() {
    let digest = sha256_hex(PAYLOAD);
    let (base_url, server) = start_release_server(
        vec![(
            "/releases/latest/download/release.toml",
            Route::ok(manifest_toml("2.0.0", "memoria-2.0.0.tar.gz", &digest, None)),
        )],
        1,
    );

    let latest = retriever_for(&base_url)
        .fetch_latest_version()
        .expect("latest lookup must succeed");
    server.join().expect("server thread must join");

    assert_eq!(latest, v("2.0.0"));
}

#[test]
fn pinned_key_requires_valid_manifest_signature() {
    let signing_key = SigningKey::from_bytes(&[9_u8; 32]);
    let public_key = hex::encode(signing_key.verifying_key().to_bytes());
    let digest = sha256_hex(PAYLOAD);
    let signed_payload = format!("1.2.0\nmemoria.tar.gz\n{digest}\n");
    let signature = hex::encode(signing_key.sign(signed_payload.as_bytes()).to_bytes());

    let (base_url, server) = start_release_server(
        vec![
            (
                "/releases/download/v1.2.0/release.toml",
                Route::ok(manifest_toml("1.2.0", "memoria.tar.gz", &digest, Some(&signature))),
            ),
            ("/releases/download/v1.2.0/memoria.tar.gz", Route::ok(PAYLOAD)),
            (
                "/releases/latest/download/release.toml",
                Route::ok(manifest_toml("1.2.0", "memoria.tar.gz", &digest, None)),
            ),
        ],
        3,
    );

    let retriever = Retriever::new(ReleaseSource {
        base_url: base_url.clone(),
        timeout: Duration::from_secs(5),
        allow_insecure_http: true,
        trusted_public_key: Some(public_key),
    })
    .expect("retriever must build");

    let artifact = retriever
        .fetch_verified(&v("1.2.0"))
        .expect("signed release must verify");
    assert_eq!(artifact.bytes(), PAYLOAD);

    let err = retriever
        .fetch_latest_version()
        .expect_err("unsigned manifest must be rejected");
    server.join().expect("server thread must join");
    assert!(matches!(err, Error::Integrity { .. }), "unexpected: {err:?}");
}
