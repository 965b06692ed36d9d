use anyhow::Result;
use clap::Parser;

use syncerch::cli::TokenOpts;
use syncerch::tokens;

fn main() -> Result<()> {
    let opts = TokenOpts::parse();
    if opts.length == 0 {
        anyhow::bail!("token length must be positive");
    }
    let token = tokens::generate_token(opts.length);
    tokens::append_token(&opts.file, &token)?;
    println!("New token: {token}");
    Ok(())
}
