#![forbid(unsafe_code)]

mod database;
use self::database::{Database, DatabaseError};

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use serde::Serialize;
use structopt::StructOpt;
use thiserror::Error;
use cosign_crypto::{CryptoError, KeyPair, sign};
use cosign_ca::{AuthorityConfig, Certificate, CertificateError, IssuanceError, KeyUsage};
use cosign_ledger::{
    CachingResolver, Contract, ContractBody, ContractId, LedgerContext, LedgerError, Offer,
    OfferId, PartyId, PartyKind, canonicalize,
};

#[derive(StructOpt)]
struct Args {
    #[structopt(long)]
    path: PathBuf,
    #[structopt(long)]
    verbose: bool,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Creates the root certificate of this node
    Init {
        #[structopt(long, default_value = "Cosign Root")]
        subject: String,
        #[structopt(long)]
        organization: Option<String>,
        #[structopt(long)]
        validity_days: Option<i64>,
    },
    /// Issues a key pair and a certificate to a party
    Enroll {
        #[structopt(long, parse(try_from_str = parse_kind))]
        kind: PartyKind,
        #[structopt(long)]
        id: u64,
        #[structopt(long)]
        name: String,
        #[structopt(long, default_value = "sign-data")]
        usage: KeyUsage,
        #[structopt(long)]
        certificate: PathBuf,
        #[structopt(long)]
        key: PathBuf,
    },
    /// Prints the signature of the canonical contract body
    Sign {
        #[structopt(long)]
        key: PathBuf,
        #[structopt(long)]
        body: PathBuf,
    },
    Verify {
        #[structopt(long)]
        certificate: PathBuf,
        #[structopt(long)]
        body: PathBuf,
        #[structopt(long)]
        signature: String,
    },
    /// Creates a draft contract
    Contract {
        #[structopt(long)]
        investor: u64,
        #[structopt(long)]
        body: PathBuf,
    },
    Offer {
        #[structopt(long)]
        contract: u64,
        #[structopt(long)]
        supplier: u64,
        #[structopt(long)]
        signature: String,
        #[structopt(long)]
        comment: Option<String>,
    },
    Accept {
        #[structopt(long)]
        contract: u64,
        #[structopt(long)]
        offer: u64,
        #[structopt(long)]
        signature: String,
    },
    Show {
        #[structopt(long)]
        contract: u64,
    },
}

fn parse_kind(s: &str) -> Result<PartyKind, String> {
    match s {
        "supplier" => Ok(PartyKind::Supplier),
        "investor" => Ok(PartyKind::Investor),
        _ => Err(format!("unknown party kind {}, expected supplier or investor", s)),
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("{}", _0)]
    Database(#[from] DatabaseError),
    #[error("storage: {}", _0)]
    Storage(#[from] sled::Error),
    #[error("{}", _0)]
    Ledger(#[from] LedgerError),
    #[error("issuance: {}", _0)]
    Issuance(#[from] IssuanceError),
    #[error("key: {}", _0)]
    Crypto(#[from] CryptoError),
    #[error("certificate: {}", _0)]
    Certificate(#[from] CertificateError),
    #[error("io: {}", _0)]
    Io(#[from] io::Error),
    #[error("json: {}", _0)]
    Json(#[from] serde_json::Error),
}

fn main() {
    let Args {
        path,
        verbose,
        command,
    } = Args::from_args();

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let db_path = path.join("db");
    let db = match Database::open(&db_path) {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(
                "fatal error: failed to open db at: {:?}, error: {}",
                db_path,
                error,
            );
            std::process::exit(1);
        },
    };

    let result = run(&db, command);
    // flushes on drop, before a possible exit
    drop(db);
    if let Err(error) = result {
        match &error {
            Error::Ledger(e) if e.is_rejection() => tracing::warn!("rejected: {}", e),
            _ => tracing::error!("fatal error: {}", error),
        }
        std::process::exit(1);
    }
}

fn run(db: &Database, command: Command) -> Result<(), Error> {
    match command {
        Command::Init {
            subject,
            organization,
            validity_days,
        } => {
            let mut config = AuthorityConfig::default();
            if let Some(organization) = organization {
                config.organization = organization;
            }
            if let Some(days) = validity_days {
                config.validity = days
                    .checked_mul(86_400)
                    .map(time::Duration::seconds)
                    .ok_or(IssuanceError::Validity)?;
            }
            let authority = db.authority(config)?;
            let (root, _) = db.root_or_insert(&authority, &subject)?;
            tracing::info!(serial = root.serial_number(), "root ready");
            print!("{}", root.pem());
        },
        Command::Enroll {
            kind,
            id,
            name,
            usage,
            certificate,
            key,
        } => {
            let (root, root_key) = db.root()?.ok_or(DatabaseError::NoAuthority)?;
            let authority = db.authority(db.config()?)?;
            let enrollment = authority.enroll(&name, usage, &root, &root_key)?;
            fs::write(&key, enrollment.private_key_pem()?.as_bytes())?;
            fs::write(&certificate, enrollment.certificate_pem())?;
            db.register(kind, PartyId(id), &name, &enrollment.certificate)?;
            println!("{}", enrollment.certificate.serial_number());
        },
        Command::Sign { key, body } => {
            let key = KeyPair::import_private(&fs::read_to_string(key)?)?;
            let body = read_body(&body)?;
            println!("{}", sign(&key, &canonicalize(&body))?);
        },
        Command::Verify {
            certificate,
            body,
            signature,
        } => {
            let certificate = Certificate::from_pem(&fs::read_to_string(certificate)?)?;
            let body = read_body(&body)?;
            if certificate.verify(&canonicalize(&body), &signature) {
                println!("valid");
            } else {
                println!("invalid");
            }
        },
        Command::Contract { investor, body } => {
            let body = read_body(&body)?;
            let id = ledger(db)?.create_contract(PartyId(investor), body)?;
            println!("{}", id);
        },
        Command::Offer {
            contract,
            supplier,
            signature,
            comment,
        } => {
            let id = ledger(db)?.submit_offer(
                ContractId(contract),
                PartyId(supplier),
                &signature,
                comment,
            )?;
            println!("{}", id);
        },
        Command::Accept {
            contract,
            offer,
            signature,
        } => {
            ledger(db)?.accept(ContractId(contract), OfferId(offer), &signature)?;
            println!("funded");
        },
        Command::Show { contract } => {
            let ledger = ledger(db)?;
            let id = ContractId(contract);
            let contract = ledger.contract(id)?;
            let offers = ledger.offers_for(id)?;
            let view = View {
                contract: &contract,
                offers: &offers,
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        },
    }
    Ok(())
}

fn ledger(db: &Database) -> Result<LedgerContext<CachingResolver<database::Directory>>, Error> {
    let resolver = CachingResolver::new(db.directory());
    let context = LedgerContext::new(db.store()?, resolver);
    Ok(match db.root()? {
        Some((root, _)) => context.with_trust_root(root),
        None => context,
    })
}

#[derive(Serialize)]
struct View<'a> {
    contract: &'a Contract,
    offers: &'a [Offer],
}

fn read_body(path: &Path) -> Result<ContractBody, Error> {
    let body: ContractBody = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(ContractBody::new(body.title, body.description, body.amount, body.must_be_done))
}
