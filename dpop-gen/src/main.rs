use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dpop_bind::{DpopKey, Proof, ProofClaims, compute_ath, create_proof, normalize_htu, sign_claims};

/// Generate a DPoP proof JWT (ES256, P-256) bound to one request and access token.
///
/// - Header: typ=dpop+jwt, alg=ES256, jwk={EC/P-256/x/y}
/// - Claims: jti, htm, htu, iat, ath (hex SHA-256 of the access token)
/// - Prints the proof plus the key thumbprint (jkt) to put in the token's cnf.jkt
#[derive(Parser, Debug)]
#[command(name = "dpop-gen", version, about)]
struct Args {
    /// HTTP method (htm), sent as given
    #[arg(long, default_value = "GET")]
    method: String,

    /// Absolute request URL (e.g. http://localhost:8000/api/resource); query/fragment are dropped
    #[arg(long)]
    url: String,

    /// Access token the proof is bound to (ath)
    #[arg(long)]
    access_token: String,

    /// P-256 private key in PKCS#8 PEM. Default: a fresh ephemeral key
    #[arg(long, value_name = "FILE")]
    key_pem: Option<PathBuf>,

    /// Override iat (unix seconds)
    #[arg(long, allow_negative_numbers = true)]
    iat: Option<i64>,

    /// Override jti
    #[arg(long)]
    jti: Option<String>,

    /// Print only the proof
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn load_key(path: Option<&PathBuf>) -> Result<DpopKey> {
    match path {
        Some(path) => {
            let pem = fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            Ok(DpopKey::from_pkcs8_pem(&pem)?)
        }
        None => Ok(DpopKey::generate()?),
    }
}

fn build_proof(args: &Args, key: &DpopKey) -> Result<Proof> {
    let proof = create_proof(&args.method, &args.url, &args.access_token, key)?;
    if args.iat.is_none() && args.jti.is_none() {
        return Ok(proof);
    }

    // Re-sign with the overrides; the rest stays as create_proof bound it.
    let claims = ProofClaims {
        jti: args.jti.clone().unwrap_or_else(|| proof.jti().to_string()),
        htm: args.method.clone(),
        htu: normalize_htu(&args.url).to_string(),
        iat: args.iat.unwrap_or(proof.iat()),
        ath: compute_ath(&args.access_token),
    };
    Ok(sign_claims(key, &claims)?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let key = load_key(args.key_pem.as_ref())?;
    let proof = build_proof(&args, &key)?;

    if args.quiet {
        println!("{}", proof);
        return Ok(());
    }

    println!("DPoP: {}", proof);
    println!("jkt (cnf.jkt): {}", key.thumbprint());
    println!("jwk: {}", serde_json::to_string(key.public_record())?);
    println!("iat: {}", proof.iat());
    println!("jti: {}", proof.jti());
    println!("ath: {}", compute_ath(&args.access_token));

    Ok(())
}
