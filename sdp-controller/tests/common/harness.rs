//! Test harness for controller E2E tests.
//!
//! Starts a real controller on a loopback port with a throwaway PKI and a
//! temporary SQLite directory, and connects members to it over mutual TLS.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use sdp_controller::framing::{FrameCodec, MAX_OUTBOUND_FRAME_SIZE};
use sdp_controller::tls::TlsServerConfig;
use sdp_controller::{
    Controller, NoopNotifier, RandomCredentialMaker, SessionContext, SessionPolicy, SqlDirectory,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;

/// A throwaway certificate authority.
pub struct TestPki {
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().expect("Failed to generate CA key");
        let mut params = CertificateParams::new(Vec::new()).expect("Failed to build CA params");
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, "sdp-test-ca");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let ca_cert = params.self_signed(&ca_key).expect("Failed to sign CA");
        Self { ca_cert, ca_key }
    }

    pub fn ca_der(&self) -> CertificateDer<'static> {
        self.ca_cert.der().clone()
    }

    /// Issue a leaf certificate signed by the CA.
    fn issue(
        &self,
        common_name: &str,
        san_dns: Vec<String>,
        usage: ExtendedKeyUsagePurpose,
    ) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        let key = KeyPair::generate().expect("Failed to generate leaf key");
        let mut params = CertificateParams::new(san_dns).expect("Failed to build leaf params");
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.extended_key_usages = vec![usage];

        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("Failed to sign leaf");

        (
            vec![cert.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
        )
    }

    pub fn server_config(&self) -> Arc<rustls::ServerConfig> {
        let (chain, key) = self.issue(
            "sdp-controller",
            vec!["localhost".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        );
        TlsServerConfig::new_mtls(chain, key, vec![self.ca_der()])
            .expect("Failed to build server TLS config")
            .into_rustls_config()
    }

    /// Client config presenting a certificate for `common_name`, or no
    /// certificate at all when `None`.
    pub fn client_config(&self, common_name: Option<&str>) -> Arc<ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_der()).expect("Failed to add CA root");

        let builder = ClientConfig::builder().with_root_certificates(roots);
        let config = match common_name {
            Some(cn) => {
                let (chain, key) = self.issue(cn, Vec::new(), ExtendedKeyUsagePurpose::ClientAuth);
                builder
                    .with_client_auth_cert(chain, key)
                    .expect("Failed to set client certificate")
            }
            None => builder.with_no_client_auth(),
        };
        Arc::new(config)
    }
}

/// A controller listening on a loopback port.
pub struct TestController {
    pub addr: SocketAddr,
    pub directory: SqlDirectory,
    pki: TestPki,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl TestController {
    pub async fn start() -> Self {
        Self::with_policy(SessionPolicy::default()).await
    }

    pub async fn with_policy(policy: SessionPolicy) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let directory = SqlDirectory::open(dir.path().join("sdp.db"), 4)
            .await
            .expect("Failed to open directory");

        let pki = TestPki::new();
        let ctx = SessionContext {
            directory: Arc::new(directory.clone()),
            generator: Arc::new(RandomCredentialMaker::new(32, 64).expect("valid key lengths")),
            notifier: Arc::new(NoopNotifier),
            policy,
        };

        let controller = Controller::bind(
            "127.0.0.1:0".parse().unwrap(),
            pki.server_config(),
            ctx,
            16,
            None,
        )
        .await
        .expect("Failed to bind controller");
        let addr = controller.local_addr().expect("Failed to read local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(controller.run(async {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            directory,
            pki,
            shutdown: Some(shutdown_tx),
            _dir: dir,
        }
    }

    /// Provision a member row whose keys are `{id}-enc` and `{id}-hmac`.
    pub async fn add_member(&self, id: &str, kind: &str, due: Option<DateTime<Utc>>) {
        let encrypt_key = format!("{}-enc", id);
        let hmac_key = format!("{}-hmac", id);
        self.add_member_with_keys(id, kind, due, &encrypt_key, &hmac_key)
            .await;
    }

    pub async fn add_member_with_keys(
        &self,
        id: &str,
        kind: &str,
        due: Option<DateTime<Utc>>,
        encrypt_key: &str,
        hmac_key: &str,
    ) {
        sqlx::query(
            "INSERT INTO sdpid (id, type, encrypt_key, hmac_key, cred_update_due) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id)
        .bind(kind)
        .bind(encrypt_key)
        .bind(hmac_key)
        .bind(due.map(|d| d.to_rfc3339()))
        .execute(self.directory.pool())
        .await
        .expect("Failed to insert member");
    }

    /// Let `members` reach `port` through gateway `gateway`.
    pub async fn grant(&self, gateway: &str, port: &str, members: &[&str]) {
        let pool = self.directory.pool();

        let gateway_id = sqlx::query("INSERT INTO gateway (sdpid_id) VALUES (?1)")
            .bind(gateway)
            .execute(pool)
            .await
            .expect("Failed to insert gateway")
            .last_insert_rowid();

        let service_id = sqlx::query("INSERT INTO service (name) VALUES (?1)")
            .bind(port)
            .execute(pool)
            .await
            .expect("Failed to insert service")
            .last_insert_rowid();

        sqlx::query(
            "INSERT INTO service_gateway (service_id, gateway_id, protocol_port) VALUES (?1, ?2, ?3)",
        )
        .bind(service_id)
        .bind(gateway_id)
        .bind(port)
        .execute(pool)
        .await
        .expect("Failed to insert service_gateway");

        for member in members {
            sqlx::query("INSERT INTO sdpid_service (sdpid_id, service_id) VALUES (?1, ?2)")
                .bind(member)
                .bind(service_id)
                .execute(pool)
                .await
                .expect("Failed to insert sdpid_service");
        }
    }

    /// Connect as the member named `common_name`.
    pub async fn connect(&self, common_name: &str) -> TestMember {
        let stream = self
            .connect_tls(Some(common_name))
            .await
            .expect("TLS connection failed");
        TestMember {
            framed: Framed::new(stream, FrameCodec::with_max_frame(MAX_OUTBOUND_FRAME_SIZE)),
        }
    }

    pub async fn connect_tls(
        &self,
        common_name: Option<&str>,
    ) -> std::io::Result<TlsStream<TcpStream>> {
        let connector = TlsConnector::from(self.pki.client_config(common_name));
        let tcp = TcpStream::connect(self.addr).await?;
        let domain = ServerName::try_from("localhost").expect("valid server name");
        connector.connect(domain, tcp).await
    }
}

impl Drop for TestController {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// One connected member.
pub struct TestMember {
    framed: Framed<TlsStream<TcpStream>, FrameCodec>,
}

impl TestMember {
    pub async fn send(&mut self, msg: Value) {
        let payload = serde_json::to_vec(&msg).expect("Failed to encode message");
        self.framed
            .send(Bytes::from(payload))
            .await
            .expect("Failed to send message");
    }

    /// Send `payload` as one frame, whether or not it is JSON.
    pub async fn send_raw(&mut self, payload: &[u8]) {
        self.framed
            .send(Bytes::copy_from_slice(payload))
            .await
            .expect("Failed to send frame");
    }

    /// Next message from the controller, or `None` once it has closed the
    /// connection.
    pub async fn recv(&mut self) -> Option<Value> {
        let next = tokio::time::timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("Timed out waiting for the controller");

        match next {
            Some(Ok(frame)) => Some(serde_json::from_slice(&frame).expect("Invalid JSON from controller")),
            Some(Err(_)) | None => None,
        }
    }

    /// Assert nothing arrives for a short while.
    pub async fn assert_quiet(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(200), self.framed.next()).await;
        assert!(next.is_err(), "Unexpected message: {:?}", next);
    }
}
