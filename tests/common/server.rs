//! Test server management.
//!
//! Spawns and manages broadcastd instances for integration testing.

use std::net::TcpListener;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Extra configuration for a test server.
#[derive(Default)]
pub struct Options {
    /// Lines appended to the `[listen]` section.
    pub listen: String,
    /// Lines appended to the `[broadcast]` section.
    pub broadcast: String,
    /// Also start the line-based plaintext listener.
    pub plaintext: bool,
}

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    plaintext_port: Option<u16>,
    _dir: TempDir,
}

/// Ask the OS for a port that is free right now.
fn free_port() -> anyhow::Result<u16> {
    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}

impl TestServer {
    /// Spawn a server with the default configuration.
    #[allow(dead_code)]
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(Options::default()).await
    }

    /// Spawn a server with extra configuration.
    pub async fn spawn_with(options: Options) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let port = free_port()?;
        let plaintext_port = if options.plaintext {
            Some(free_port()?)
        } else {
            None
        };

        let mut config = format!(
            r#"
[server]
name = "test.server"
metrics_port = 0

[listen]
address = "127.0.0.1:{port}"
{listen}

[broadcast]
{broadcast}
"#,
            listen = options.listen,
            broadcast = options.broadcast,
        );
        if let Some(plaintext_port) = plaintext_port {
            config.push_str(&format!(
                "\n[plaintext]\naddress = \"127.0.0.1:{plaintext_port}\"\n"
            ));
        }

        let config_path = dir.path().join("broadcastd.toml");
        std::fs::write(&config_path, config)?;

        let child = Command::new(env!("CARGO_BIN_EXE_broadcastd"))
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            plaintext_port,
            _dir: dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the server is accepting connections.
    ///
    /// Both listeners are bound before either starts accepting, so one
    /// successful connect covers both.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(self.address()).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// Address of the WebSocket listener.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// URL of the WebSocket endpoint.
    #[allow(dead_code)]
    pub fn url(&self) -> String {
        format!("ws://{}/message", self.address())
    }

    /// Address of the plaintext listener, if enabled.
    #[allow(dead_code)]
    pub fn plaintext_address(&self) -> Option<String> {
        self.plaintext_port.map(|p| format!("127.0.0.1:{p}"))
    }

    /// Deliver SIGINT, as Ctrl-C in a terminal would.
    #[allow(dead_code)]
    pub fn interrupt(&self) -> anyhow::Result<()> {
        let status = Command::new("kill")
            .args(["-INT", &self.child.id().to_string()])
            .status()?;
        anyhow::ensure!(status.success(), "kill -INT failed: {status}");
        Ok(())
    }

    /// Wait for the server process to exit on its own.
    #[allow(dead_code)]
    pub async fn wait_for_exit(&mut self, limit: Duration) -> anyhow::Result<ExitStatus> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            anyhow::ensure!(
                tokio::time::Instant::now() < deadline,
                "server still running after {limit:?}"
            );
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Connect a WebSocket client and consume its welcome.
    #[allow(dead_code)]
    pub async fn connect(&self) -> anyhow::Result<super::client::WsClient> {
        let mut client = super::client::WsClient::connect(&self.url()).await?;
        client.expect_text(super::client::WELCOME).await?;
        Ok(client)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
