use pwswap::{argon2, bcrypt, drupal7, md5_crypt, md5_plain, md5_salted, pbkdf2, phpass, scrypt, sha2_crypt};
use pwswap::{Hasher, Swapper, Validator, Verdict};

use std::io;
use std::sync::Arc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::debug;

#[derive(Debug, Parser)]
#[command(author, version, about)]
#[command(infer_subcommands = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Hash a password.
    Generate(GenerateArgs),
    /// Check a password against a hash, and print an upgraded hash if due.
    Verify(VerifyArgs),
    /// Check the parameters of a hash against the default bounds.
    Validate(ValidateArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scheme {
    Argon2id,
    Argon2i,
    Scrypt,
    Bcrypt,
    Pbkdf2Sha1,
    Pbkdf2Sha256,
    Pbkdf2Sha512,
    Sha256,
    Sha512,
    Md5,
    Phpass,
    Drupal7,
    Md5Salted,
    Md5Plain,
}

impl Scheme {
    fn hasher(self) -> Arc<dyn Hasher> {
	match self {
	    Scheme::Argon2id => Arc::new(argon2::Hasher::id(argon2::Params::RECOMMENDED_ID)),
	    Scheme::Argon2i => Arc::new(argon2::Hasher::i(argon2::Params::RECOMMENDED_I)),
	    Scheme::Scrypt => Arc::new(scrypt::Hasher::default()),
	    Scheme::Bcrypt => Arc::new(bcrypt::Hasher::default()),
	    Scheme::Pbkdf2Sha1 => Arc::new(pbkdf2::Hasher::sha1(pbkdf2::Params::recommended(pbkdf2::HashFunc::Sha1))),
	    Scheme::Pbkdf2Sha256 => Arc::new(pbkdf2::Hasher::sha256(pbkdf2::Params::recommended(pbkdf2::HashFunc::Sha256))),
	    Scheme::Pbkdf2Sha512 => Arc::new(pbkdf2::Hasher::sha512(pbkdf2::Params::recommended(pbkdf2::HashFunc::Sha512))),
	    Scheme::Sha256 => Arc::new(sha2_crypt::Hasher::sha256(sha2_crypt::DEFAULT_ROUNDS)),
	    Scheme::Sha512 => Arc::new(sha2_crypt::Hasher::sha512(sha2_crypt::DEFAULT_ROUNDS)),
	    Scheme::Md5 => Arc::new(md5_crypt::Hasher::new()),
	    Scheme::Phpass => Arc::new(phpass::Hasher::default()),
	    Scheme::Drupal7 => Arc::new(drupal7::Hasher::default()),
	    Scheme::Md5Salted => Arc::new(md5_salted::Hasher::new(md5_salted::Variant::Suffix)),
	    Scheme::Md5Plain => Arc::new(md5_plain::Hasher),
	}
    }
}

#[derive(Clone, Debug, Args)]
struct GenerateArgs {
    #[arg(long, short)]
    password: Option<String>,
    #[arg(long, short, value_enum, default_value_t = Scheme::Argon2id)]
    scheme: Scheme,
}

#[derive(Clone, Debug, Args)]
struct VerifyArgs {
    #[arg(long, short)]
    password: Option<String>,
    /// Scheme of upgraded hashes.
    #[arg(long, short, value_enum, default_value_t = Scheme::Argon2id)]
    scheme: Scheme,
    hash: String,
}

#[derive(Clone, Debug, Args)]
struct ValidateArgs {
    hash: String,
}

fn generate(GenerateArgs{ password, scheme }: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pw = prompt_password(password, true)?;
    println!("{}", scheme.hasher().hash(&pw)?);
    Ok(())
}

fn verify(VerifyArgs{ password, scheme, hash }: VerifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pw = prompt_password(password, false)?;
    let swapper = Swapper::with_shared(scheme.hasher())
	.fallback(argon2::verify)
	.fallback(scrypt::verify)
	.fallback(bcrypt::verify)
	.fallback(pbkdf2::verify)
	.fallback(sha2_crypt::verify)
	.fallback(md5_crypt::verify)
	.fallback(phpass::verify)
	.fallback(drupal7::verify)
	.fallback(md5_salted::verify)
	.fallback(md5_plain::verify);
    match swapper.verify(&hash, &pw) {
	Ok(None) => println!("valid"),
	Ok(Some(updated)) => println!("valid, updated: {}", updated),
	Err(pwswap::Error::PasswordMismatch) => println!("not valid"),
	Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn validate(ValidateArgs{ hash }: ValidateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let validators: Vec<Box<dyn Validator>> = vec![
	Box::new(argon2::ValidationOpts::default()),
	Box::new(scrypt::ValidationOpts::default()),
	Box::new(bcrypt::ValidationOpts::default()),
	Box::new(pbkdf2::ValidationOpts::default()),
	Box::new(sha2_crypt::ValidationOpts::default()),
	Box::new(phpass::ValidationOpts::default()),
	Box::new(drupal7::ValidationOpts::default()),
    ];
    for (i, v) in validators.iter().enumerate() {
	match v.validate(&hash)? {
	    Verdict::Skip => debug!("validator {} skipped", i),
	    verdict => {
		println!("{}", verdict);
		return Ok(());
	    },
	}
    }
    println!("{}", Verdict::Skip);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Generate(cli.generate));
    match cmd {
	Commands::Generate(args) => generate(args)?,
	Commands::Verify(args) => verify(args)?,
	Commands::Validate(args) => validate(args)?,
    };
    Ok(())
}

fn prompt_password(password: Option<String>, confirm: bool) -> io::Result<String> {
    match password {
	Some(pw) => Ok(pw),
	None if !confirm => rpassword::prompt_password("Password: "),
	None => loop {
	    let pw = rpassword::prompt_password("Enter new password: ")?;
	    let confirmed = rpassword::prompt_password("Retype new password: ")?;
	    if pw == confirmed {
		return Ok(pw)
	    }
	    println!("Error: Passwords don't match!")
	}
    }
}
