use std::env;

use anyhow::{Context, Result};
use onenet_relay::{Credentials, sign_now};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <product_id> <device_name> <device_key>", args[0]);
        eprintln!("  device_key: base64 device secret from the OneNET console");
        eprintln!("Prints a token valid for 5 minutes.");
        std::process::exit(1);
    }

    let credentials = Credentials::new(&args[1], &args[2], &args[3]);
    let token = sign_now(&credentials).context("Failed to compute token")?;

    println!("{}", token);
    Ok(())
}
