//! Integration tests for cardcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use cardcache::catalog::CardRecord;
    use cardcache::config::{Config, ImageQuality};
    use predicates::prelude::*;
    use std::io::{Read, Write};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const CARDS: &str = r#"[
        {"id": "bolt", "name": "Lightning Bolt", "set": "LEA", "collector_number": "161",
         "image_uris": {"normal": "http://127.0.0.1:9/bolt.jpg"}}
    ]"#;

    /// Temp dir holding a config file and a catalog
    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new(auto_download: bool) -> Self {
            Self::with_catalog(auto_download, CARDS)
        }

        fn with_catalog(auto_download: bool, cards: &str) -> Self {
            Self::build(cards, |config| config.images.auto_download = auto_download)
        }

        fn build(cards: &str, tweak: impl FnOnce(&mut Config)) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("cards.json"), cards).unwrap();

            let mut config = Config::default();
            config.images.cache_dir = Some(dir.path().join("images"));
            config.catalog.path = Some(dir.path().join("cards.json"));
            config.api.rate_limit_delay = 0.0;
            config.api.max_retries = 0;
            config.api.timeout_seconds = 5;
            tweak(&mut config);
            std::fs::write(
                dir.path().join("config.toml"),
                toml::to_string_pretty(&config).unwrap(),
            )
            .unwrap();

            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn config_path(&self) -> PathBuf {
            self.path().join("config.toml")
        }

        fn cmd(&self) -> Command {
            let mut cmd = cardcache();
            cmd.env_remove("CARDCACHE_CATALOG")
                .arg("--config")
                .arg(self.config_path());
            cmd
        }

        /// Put an image on disk the way the cache would have stored it
        fn seed_image(&self, card_json: &str, bytes: &[u8]) {
            let cards: Vec<CardRecord> = serde_json::from_str(card_json).unwrap();
            let key = cards[0].cache_key(ImageQuality::Normal);
            let images = self.path().join("images");
            std::fs::create_dir_all(&images).unwrap();
            std::fs::write(images.join(format!("{}.img", key)), bytes).unwrap();
        }
    }

    fn cardcache() -> Command {
        cargo_bin_cmd!("cardcache")
    }

    /// Serve one canned image response on a local port
    fn serve_image_once(body: &'static [u8]) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
                let _ = stream.flush();
            }
        });
        format!("http://{}/bolt.jpg", addr)
    }

    #[test]
    fn help_displays() {
        cardcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("size-bounded card image cache"));
    }

    #[test]
    fn version_displays() {
        cardcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cardcache"));
    }

    #[test]
    fn config_path_honours_flag() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[images]"))
            .stdout(predicate::str::contains("auto_download = false"));
    }

    #[test]
    fn config_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        cardcache()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.exists());

        cardcache()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_fails_with_hint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[images]\ncache_size_mb = \"big\"\n").unwrap();

        cardcache()
            .arg("--config")
            .arg(&path)
            .arg("info")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn info_json_on_empty_cache() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["info", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"entry_count\": 0"))
            .stdout(predicate::str::contains("\"auto_download\": false"));
    }

    #[test]
    fn info_leaves_cache_untouched() {
        let ws = Workspace::build(CARDS, |config| config.images.cache_size_mb = 1);
        let images = ws.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        let writing = images.join("abc.0123abcd.tmp");
        let big = images.join("abc.img");
        std::fs::write(&writing, b"half").unwrap();
        std::fs::write(&big, vec![0u8; 2 * 1024 * 1024]).unwrap();

        ws.cmd()
            .args(["info", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"entry_count\": 1"));

        assert!(writing.exists());
        assert!(big.exists());
        assert!(!images.join("index.json").exists());
    }

    #[test]
    fn clear_empty_cache() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["clear", "-y"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already empty"));
    }

    #[test]
    fn clear_removes_seeded_images() {
        let ws = Workspace::new(false);
        ws.seed_image(CARDS, b"jpeg-bytes");

        ws.cmd()
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared 1 image(s)"));

        ws.cmd()
            .args(["info", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"entry_count\": 0"));
    }

    #[test]
    fn get_unknown_card_fails() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["get", "no-such-card"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown card: no-such-card"));
    }

    #[test]
    fn get_with_downloads_disabled_fails_on_miss() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["get", "bolt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("automatic download is disabled"));
    }

    #[test]
    fn get_missing_catalog_fails() {
        let ws = Workspace::new(false);
        ws.cmd()
            .arg("--catalog")
            .arg(ws.path().join("absent.json"))
            .args(["get", "bolt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Card catalog not found"));
    }

    #[test]
    fn get_serves_cached_image_offline() {
        let ws = Workspace::new(false);
        ws.seed_image(CARDS, b"jpeg-bytes");
        let out = ws.path().join("bolt.jpg");

        ws.cmd()
            .args(["get", "bolt", "-o"])
            .arg(&out)
            .assert()
            .success();

        assert_eq!(std::fs::read(&out).unwrap(), b"jpeg-bytes");
    }

    #[test]
    fn get_downloads_and_caches() {
        let url = serve_image_once(b"fresh-jpeg");
        let cards = CARDS.replace("http://127.0.0.1:9/bolt.jpg", &url);
        let ws = Workspace::with_catalog(true, &cards);

        ws.cmd()
            .args(["get", "bolt"])
            .assert()
            .success()
            .stdout(predicate::str::contains("downloaded"));

        // The stub served once; a second get must come from disk
        ws.cmd()
            .args(["get", "bolt"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hit"));
    }

    #[test]
    fn prefetch_requires_target() {
        let ws = Workspace::new(false);
        ws.cmd().arg("prefetch").assert().failure();
    }

    #[test]
    fn prefetch_reports_failures() {
        let ws = Workspace::new(false);
        ws.cmd()
            .args(["prefetch", "bolt", "ghost"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("0 downloaded"))
            .stderr(predicate::str::contains("could not be prefetched"));
    }
}
