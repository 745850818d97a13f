//! Integration tests for artcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn artcache(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("artcache");
        cmd.env("ARTCACHE_CONFIG", temp.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("rebuilt Maven artifacts"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("artcache"));
    }

    #[test]
    fn key_prints_hash() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["key", "org.foo:bar:1.0"])
            .assert()
            .success()
            .stdout("f26a87e8bdd2a3e96aaf6059696a21041205dc956546d054294bfc025d1e700d\n");
    }

    #[test]
    fn key_with_namespace() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["key", "org/foo:bar:1.0", "--namespace", "team"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with(
                "team_f26a87e8bdd2a3e96aaf6059696a21041205dc956546d054294bfc025d1e700d",
            ));
    }

    #[test]
    fn key_rejects_bad_coordinate() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["key", "org.foo"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid coordinate"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[registry]"));
    }

    #[test]
    fn config_init_then_refuse() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(temp.path().join("config.toml").exists());

        artcache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[registry\n").unwrap();
        artcache(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn get_requires_registry_owner() {
        let temp = TempDir::new().unwrap();
        artcache(&temp)
            .args(["get", "org.foo:bar:1.0", "bar-1.0.jar"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("registry.owner"))
            .stderr(predicate::str::contains("Hint:"));
    }
}

mod registry_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use assert_cmd::assert::OutputAssertExt;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use predicates::prelude::*;
    use std::process::Output;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWNER_REPO: &str = "/v2/hacbs/artifact-deployments";
    const KEY: &str = "f26a87e8bdd2a3e96aaf6059696a21041205dc956546d054294bfc025d1e700d";
    const MANIFEST_DIGEST: &str =
        "sha256:3b1f8e0c5a9d2e4f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f";
    const LAYER_DIGEST: &str = "sha256:aa11";
    const OCI: &str = "application/vnd.oci.image.manifest.v1+json";

    fn layer_archive() -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let files: [(&str, &[u8]); 2] = [
            ("artifacts/org/foo/bar/1.0/bar-1.0.jar", &[3u8; 1024]),
            ("artifacts/org/foo/bar/1.0/bar-1.0.jar.sha1", b"abc123\n"),
        ];
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn manifest() -> String {
        format!(
            r#"{{
  "schemaVersion": 2,
  "mediaType": "{OCI}",
  "config": {{"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:c0", "size": 2}},
  "layers": [
    {{"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:0a", "size": 1}},
    {{"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:0b", "size": 1}},
    {{"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "{LAYER_DIGEST}", "size": 1}}
  ]
}}"#
        )
    }

    fn write_config(temp: &TempDir, server: &MockServer, gavs: &[&str]) {
        let gavs = gavs
            .iter()
            .map(|g| format!("\"{}\"", g))
            .collect::<Vec<_>>()
            .join(", ");
        let config = format!(
            r#"[registry]
host = "{}"
owner = "hacbs"
repository = "artifact-deployments"
insecure = true
timeout_secs = 5

[cache]
root = '{}'

[rebuilt]
gavs = [{}]
"#,
            server.address(),
            temp.path().join("cache").display(),
            gavs
        );
        std::fs::write(temp.path().join("config.toml"), config).unwrap();
    }

    fn artcache(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("artcache");
        cmd.env("ARTCACHE_CONFIG", temp.path().join("config.toml"));
        cmd
    }

    // The binary blocks; keep it off the runtime driving the mock server
    async fn run(mut cmd: Command) -> Output {
        tokio::task::spawn_blocking(move || cmd.output().unwrap())
            .await
            .unwrap()
    }

    async fn mount_manifest(server: &MockServer, calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{}/manifests/{}", OWNER_REPO, KEY)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", OCI)
                    .insert_header("docker-content-digest", MANIFEST_DIGEST)
                    .set_body_string(manifest()),
            )
            .expect(calls)
            .mount(server)
            .await;
    }

    async fn mount_blob(server: &MockServer, calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{}/blobs/{}", OWNER_REPO, LAYER_DIGEST)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(layer_archive()))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_fetches_once_and_serves_from_cache() {
        let server = MockServer::start().await;
        mount_manifest(&server, 2).await;
        mount_blob(&server, 1).await;

        let temp = TempDir::new().unwrap();
        write_config(&temp, &server, &["org.foo:bar:1.0"]);

        let output_file = temp.path().join("bar.jar");
        let mut first = artcache(&temp);
        first.args(["get", "org.foo:bar:1.0", "bar-1.0.jar", "-o"]);
        first.arg(&output_file);
        run(first)
            .await
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote 1024 bytes"));
        assert_eq!(std::fs::read(&output_file).unwrap(), vec![3u8; 1024]);

        let digest_dir = temp
            .path()
            .join("cache")
            .join(MANIFEST_DIGEST.trim_start_matches("sha256:"));
        assert!(digest_dir.join("artifacts").is_dir());

        let mut second = artcache(&temp);
        second.args(["get", "org.foo:bar:1.0", "bar-1.0.jar"]);
        run(second)
            .await
            .assert()
            .success()
            .stdout(predicate::str::contains("size: 1024"))
            .stdout(predicate::str::contains("sha1: abc123"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn not_rebuilt_never_contacts_registry() {
        let server = MockServer::start().await;
        mount_manifest(&server, 0).await;
        mount_blob(&server, 0).await;

        let temp = TempDir::new().unwrap();
        write_config(&temp, &server, &["org.other:thing:2.0"]);

        let mut cmd = artcache(&temp);
        cmd.args(["get", "org.foo:bar:1.0", "bar-1.0.jar"]);
        run(cmd)
            .await
            .assert()
            .failure()
            .stderr(predicate::str::contains("Artifact not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn assume_rebuilt_bypasses_set() {
        let server = MockServer::start().await;
        mount_manifest(&server, 1).await;
        mount_blob(&server, 1).await;

        let temp = TempDir::new().unwrap();
        write_config(&temp, &server, &[]);

        let mut cmd = artcache(&temp);
        cmd.args(["get", "org.foo:bar:1.0", "bar-1.0.jar", "--assume-rebuilt"]);
        run(cmd)
            .await
            .assert()
            .success()
            .stdout(predicate::str::contains("sha1: abc123"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_tag_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/manifests/{}", OWNER_REPO, KEY)))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        write_config(&temp, &server, &["org.foo:bar:1.0"]);

        let mut cmd = artcache(&temp);
        cmd.args(["get", "org.foo:bar:1.0", "bar-1.0.jar"]);
        run(cmd)
            .await
            .assert()
            .failure()
            .stderr(predicate::str::contains("Artifact not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_file_in_image_is_not_found() {
        let server = MockServer::start().await;
        mount_manifest(&server, 1).await;
        mount_blob(&server, 1).await;

        let temp = TempDir::new().unwrap();
        write_config(&temp, &server, &["org.foo:bar:1.0"]);

        let mut cmd = artcache(&temp);
        cmd.args(["get", "org.foo:bar:1.0", "bar-1.0-sources.jar"]);
        run(cmd)
            .await
            .assert()
            .failure()
            .stderr(predicate::str::contains("Artifact not found"));
    }
}
