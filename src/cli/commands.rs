//! CLI command implementations

use anyhow::Result;
use dialoguer::{Confirm, Password};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::chain::types::{Amount, Chain};
use crate::config::{mask_url, Config};
use crate::scan;
use crate::wallet::{Identity, WalletContext, SESSION_TTL};

/// What `reveal` prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RevealTarget {
    Key,
    Phrase,
}

/// Create a new wallet
pub async fn create(config: &Config, remember: bool) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;
    confirm_overwrite(&ctx, remember).await?;

    let (secret, confirmation) = prompt_new_secret()?;
    let identity = ctx.create_wallet(&secret, &confirmation, remember).await?;

    println!("\n=== WALLET CREATED ===\n");
    println!("Address: {}", identity.address());
    if let Some(phrase) = identity.recovery_phrase() {
        println!("\nRecovery phrase (write it down, it is shown only once):\n");
        println!("  {}", phrase);
    }
    print_remember_status(remember);
    Ok(())
}

/// Import a wallet from a private key or recovery phrase
pub async fn import(config: &Config, key: bool, phrase: bool, remember: bool) -> Result<()> {
    if key == phrase {
        anyhow::bail!("Pass exactly one of --key or --phrase");
    }

    let ctx = WalletContext::from_config(config)?;
    confirm_overwrite(&ctx, remember).await?;

    let material = Zeroizing::new(if key {
        Password::new().with_prompt("Private key").interact()?
    } else {
        Password::new().with_prompt("Recovery phrase").interact()?
    });
    let (secret, confirmation) = prompt_new_secret()?;

    let identity = if key {
        ctx.import_private_key(&material, &secret, &confirmation, remember)
            .await?
    } else {
        ctx.import_recovery_phrase(&material, &secret, &confirmation, remember)
            .await?
    };

    println!("\n=== WALLET IMPORTED ===\n");
    println!("Address: {}", identity.address());
    print_remember_status(remember);
    Ok(())
}

/// Unlock the remembered wallet and show its address
pub async fn restore(config: &Config) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;
    let (identity, _secret) = unlock(&ctx).await?;

    println!("\nRestored wallet {}", identity.address());
    if let Some(remaining) = ctx.session().remaining() {
        println!("Session valid for {} minutes", remaining.as_secs() / 60);
    }
    Ok(())
}

/// Delete the remembered wallet without unlocking it
pub async fn forget(config: &Config) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;
    if !ctx.has_snapshot().await? {
        println!("No remembered wallet.");
        return Ok(());
    }

    let confirmed = Confirm::new()
        .with_prompt("Forget the remembered wallet? Without its key or phrase it cannot be recovered.")
        .default(false)
        .interact()?;
    if !confirmed {
        info!("Forget cancelled by user");
        return Ok(());
    }

    ctx.decline_restore().await?;
    println!("Remembered wallet removed.");
    Ok(())
}

/// Show balances on one or all chains
pub async fn balance(config: &Config, chain: Option<&str>) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;
    let (identity, _secret) = unlock(&ctx).await?;

    println!("\n=== BALANCES: {} ===\n", identity.address());
    match chain {
        Some(chain_id) => {
            let chain: Chain = chain_id.parse()?;
            let balance = ctx.balance(chain.id()).await?;
            println!("{:<8} {}", chain.id(), balance);
        }
        None => {
            for entry in ctx.balances().await? {
                println!("{:<8} {}", entry.chain.id(), entry.balance);
            }
        }
    }
    println!("\n(Unreachable endpoints show 0.0)");
    Ok(())
}

/// Send native coin
pub async fn send(config: &Config, chain_id: &str, to: &str, amount: &str, force: bool) -> Result<()> {
    let chain: Chain = chain_id.parse()?;
    let to = scan::resolve(to)?;
    let amount: Amount = amount.parse()?;

    let ctx = WalletContext::from_config(config)?;
    let (identity, secret) = unlock(&ctx).await?;

    let quote = ctx.quote_fee(chain.id()).await?;
    let total = amount
        .checked_add(quote.fee)
        .ok_or_else(|| anyhow::anyhow!("Amount plus fee overflows"))?;

    println!("\n=== SEND {} ===\n", chain.name());
    println!("From:   {}", identity.address());
    println!("To:     {}", to);
    println!("Amount: {} {}", amount, chain.id());
    println!("Fee:    ~{} {}", quote.fee, chain.id());
    println!("Total:  {} {}", total, chain.id());

    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Broadcast this transfer? This cannot be undone.")
            .default(false)
            .interact()?;
        if !confirmed {
            info!("Send cancelled by user");
            return Ok(());
        }
    }

    match ctx.send(chain.id(), &to, amount, &secret).await {
        Ok(receipt) => {
            println!("\nTransfer submitted!");
            println!("Hash: {}", receipt.hash);
            Ok(())
        }
        Err(e) => {
            error!("Send failed: {}", e);
            anyhow::bail!("Send failed: {}", e);
        }
    }
}

/// Resolve scanned text to an address
pub fn scan(text: &str) -> Result<()> {
    let address = scan::resolve(text)?;
    println!("{}", address);
    Ok(())
}

/// Print the private key or recovery phrase
pub async fn reveal(config: &Config, target: RevealTarget) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;
    let (_identity, secret) = unlock(&ctx).await?;

    let confirmed = Confirm::new()
        .with_prompt("Anyone who sees this can take your funds. Show it now?")
        .default(false)
        .interact()?;
    if !confirmed {
        return Ok(());
    }

    match target {
        RevealTarget::Key => {
            let key = ctx.reveal_private_key(&secret).await?;
            println!("\n{}", key.as_str());
        }
        RevealTarget::Phrase => match ctx.reveal_recovery_phrase(&secret).await? {
            Some(phrase) => println!("\n{}", phrase.as_str()),
            None => println!("\nThis wallet was imported from a private key and has no recovery phrase."),
        },
    }
    Ok(())
}

/// Show the RPC endpoint of every chain
pub fn rpc(config: &Config) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;

    println!("\n=== RPC ENDPOINTS ===\n");
    println!("{:<8} {:<12} {:<8} {}", "CHAIN", "NAME", "ID", "URL");
    println!("{}", "-".repeat(72));
    for (chain, url) in ctx.rpc_urls() {
        let marker = if url == chain.default_rpc_url() {
            ""
        } else {
            " (override)"
        };
        println!(
            "{:<8} {:<12} {:<8} {}{}",
            chain.id(),
            chain.name(),
            chain.eip155_id(),
            mask_url(&url),
            marker
        );
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Remove the remembered wallet and all session state
pub async fn logout(config: &Config) -> Result<()> {
    let ctx = WalletContext::from_config(config)?;
    ctx.logout().await?;
    println!("Logged out. The remembered wallet has been removed.");
    Ok(())
}

/// Restore the remembered wallet, prompting for its secret
///
/// Each CLI invocation is a fresh process, so this is how commands reach
/// the identity.
async fn unlock(ctx: &WalletContext) -> Result<(Identity, Zeroizing<String>)> {
    if !ctx.has_snapshot().await? {
        anyhow::bail!(
            "No remembered wallet. Run `custody create --remember` or `custody import --remember` first."
        );
    }

    let secret = Zeroizing::new(Password::new().with_prompt("Secret").interact()?);
    match ctx.restore(&secret).await {
        Ok(identity) => Ok((identity, secret)),
        Err(e) => {
            warn!("Unlock failed");
            Err(e.into())
        }
    }
}

fn prompt_new_secret() -> Result<(Zeroizing<String>, Zeroizing<String>)> {
    let secret = Zeroizing::new(Password::new().with_prompt("New secret").interact()?);
    let confirmation = Zeroizing::new(Password::new().with_prompt("Confirm secret").interact()?);
    Ok((secret, confirmation))
}

async fn confirm_overwrite(ctx: &WalletContext, remember: bool) -> Result<()> {
    if !remember || !ctx.has_snapshot().await? {
        return Ok(());
    }
    let confirmed = Confirm::new()
        .with_prompt("A remembered wallet already exists and will be replaced. Continue?")
        .default(false)
        .interact()?;
    if !confirmed {
        anyhow::bail!("Cancelled; the remembered wallet was kept");
    }
    Ok(())
}

fn print_remember_status(remember: bool) {
    if remember {
        println!(
            "\nWallet remembered (encrypted). Sessions last {} minutes.",
            SESSION_TTL.as_secs() / 60
        );
    } else {
        println!("\nWallet not remembered; it is gone when this command exits.");
    }
}
