//! carapace-keygen — generates a spend/view keypair and the public wallet
//! address that encodes it. This is the minimal wallet-adjacent CLI the
//! address codec needs to be exercisable end to end; everything past
//! key generation and address encoding (balances, signing, transaction
//! construction) is out of scope for this binary.

use clap::Parser;

use carapace_core::address;
use carapace_crypto::keypair::derive_public;
use carapace_crypto::KeyPair;

#[derive(Parser, Debug)]
#[command(name = "carapace-keygen", version, about = "Generate a Carapace wallet address")]
struct Args {
    /// Print the generated secret keys alongside the address. Off by
    /// default so a casual invocation never leaks key material to a
    /// terminal scrollback or log.
    #[arg(long)]
    show_secrets: bool,
}

fn main() {
    let args = Args::parse();

    let spend = KeyPair::generate();
    let view = KeyPair::generate();
    let public_spend = derive_public(spend.secret());
    let public_view = derive_public(view.secret());

    println!("address: {}", address::encode(&public_spend, &public_view));
    if args.show_secrets {
        println!("spend secret: {}", hex::encode(spend.secret().as_bytes()));
        println!("view secret:  {}", hex::encode(view.secret().as_bytes()));
    }
}
