use crate::cli::Args;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use log::{ info, error };
use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

/// Certificate and key paths, present only when TLS is switched on and
/// fully configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub fn tls_paths(args: &Args) -> Result<Option<TlsPaths>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        return Ok(None);
    }
    match (&args.tls_cert_path, &args.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!("TLS enabled. Certificate '{}', key '{}'", cert_path, key_path);
            Ok(Some(TlsPaths {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }))
        }
        (Some(_), None) | (None, Some(_)) => {
            error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
            Err("Missing TLS certificate or key path".into())
        }
        (None, None) => {
            error!("--enable-tls was set but no certificate/key paths provided.");
            Err("TLS enabled without cert/key".into())
        }
    }
}

pub fn load_tls_config(paths: &TlsPaths) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(&paths.cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", paths.cert_path, e)
    )?;
    let key_file = File::open(&paths.key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", paths.key_path, e)
    )?;

    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let key = match pkcs8_private_keys(&mut BufReader::new(key_file)).next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}
