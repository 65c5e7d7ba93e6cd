//! TLS termination from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

/// Load the certificate chain in `cert_path`.
fn load_certs(cert_path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(cert_path).with_context(|| format!("failed to open {cert_path}"))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("certificate file {cert_path} is not valid PEM"))?;
    if certs.is_empty() {
        bail!("no certificate found in {cert_path}");
    }
    Ok(certs)
}

/// Load the first private key in `key_path`.
fn load_private_key(key_path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(key_path).with_context(|| format!("failed to open {key_path}"))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("key file {key_path} is not valid PEM"))?
        .with_context(|| format!("no private key found in {key_path}"))
}

/// Build an acceptor serving `cert_path` with `key_path`, offering HTTP/2
/// and HTTP/1.1 over ALPN.
pub fn acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("certificate and key do not form a usable pair")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}
