//! Subcommand handlers.

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use parking_lot::RwLock;
use stockly_core::api::ApiClient;
use stockly_core::auth::{Navigator, SIGN_IN_PATH};
use stockly_core::models::{GeneratedImage, RegisterRequest, User, UserUpdate};
use stockly_core::Config;
use tracing::warn;

/// Output formatting switches.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

/// Maps the web client's view changes onto terminal messages.
pub struct CliNavigator {
    location: RwLock<String>,
}

impl CliNavigator {
    pub fn new(path: &str) -> Self {
        Self {
            location: RwLock::new(path.to_string()),
        }
    }
}

impl Navigator for CliNavigator {
    fn current_path(&self) -> String {
        self.location.read().clone()
    }

    fn navigate(&self, path: &str) {
        let previous = std::mem::replace(&mut *self.location.write(), path.to_string());
        if announces_expiry(&previous, path) {
            eprintln!("Your session has expired. Run `stockly login` to sign in again.");
        }
    }
}

/// Commands that already run on the sign-in view report their own failure.
fn announces_expiry(from: &str, to: &str) -> bool {
    to.starts_with(SIGN_IN_PATH) && !from.starts_with(SIGN_IN_PATH)
}

pub async fn login(client: &ApiClient, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    client
        .auth()
        .login(&email, &password)
        .await
        .context("Login failed. Please check your credentials and try again")?;

    config.last_email = Some(email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    match client.auth().me().await {
        Ok(user) => eprintln!("Signed in as {} <{}>", user.display_name(), user.email),
        Err(_) => eprintln!("Signed in as {}", email),
    }
    Ok(())
}

pub async fn register(
    client: &ApiClient,
    email: String,
    first_name: String,
    last_name: String,
) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let user = client
        .auth()
        .register(&RegisterRequest {
            email,
            password,
            first_name,
            last_name,
        })
        .await
        .context("Registration failed")?;
    eprintln!("Account created for {}. Run `stockly login` to sign in.", user.email);
    Ok(())
}

pub async fn google_url(client: &ApiClient) -> Result<()> {
    let url = client
        .auth()
        .google_auth_url()
        .await
        .context("Failed to connect to Google. Please try again")?;
    println!("{}", url.auth_url);
    eprintln!("Open the URL above, then run `stockly google-callback <code>` with the code from the redirect.");
    Ok(())
}

pub async fn google_callback(client: &ApiClient, code: &str) -> Result<()> {
    client
        .auth()
        .google_callback(code)
        .await
        .context("Google sign-in failed")?;
    eprintln!("Signed in with Google");
    Ok(())
}

pub async fn whoami(client: &ApiClient, output: Output) -> Result<()> {
    if !client.auth().is_authenticated() {
        bail!("Not signed in. Run `stockly login` first");
    }
    let user = client.auth().me().await?;
    print_user(&user, output)
}

pub async fn update_profile(client: &ApiClient, update: &UserUpdate, output: Output) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update; pass at least one of --first-name, --last-name, --name, --avatar-url");
    }
    let user = client.auth().update_me(update).await?;
    eprintln!("Profile updated");
    print_user(&user, output)
}

pub async fn generate(
    client: &ApiClient,
    prompt: &str,
    category: Option<&str>,
    output: Output,
) -> Result<()> {
    eprintln!("Generating images...");
    let image = client
        .images()
        .generate(prompt, category)
        .await
        .context("Image generation failed")?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&image)?);
    } else {
        for url in &image.image_urls {
            println!("{}", url);
        }
        eprintln!("Saved as {}", image.id);
    }
    Ok(())
}

pub async fn history(client: &ApiClient, skip: u32, limit: u32, output: Output) -> Result<()> {
    let images = client.images().history(skip, limit).await?;
    if output.json {
        println!("{}", serde_json::to_string_pretty(&images)?);
        return Ok(());
    }
    if images.is_empty() {
        eprintln!("No images yet. Try `stockly generate \"a lighthouse at dusk\"`.");
    }
    for image in &images {
        println!("{}", history_line(image));
    }
    Ok(())
}

/// Delete all ids concurrently; reports every failure before erroring.
pub async fn delete(client: &ApiClient, ids: &[String]) -> Result<()> {
    let images = client.images();
    let results = join_all(ids.iter().map(|id| images.delete(id))).await;

    let mut failed = 0;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(()) => eprintln!("Deleted {}", id),
            Err(e) => {
                failed += 1;
                eprintln!("Failed to delete {}: {}", id, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} deletions failed", failed, ids.len());
    }
    Ok(())
}

pub fn logout(client: &ApiClient) -> Result<()> {
    client.auth().logout()?;
    eprintln!("Signed out");
    Ok(())
}

pub async fn status(client: &ApiClient, config: &Config, base_url: &str) -> Result<()> {
    println!("API:         {}", base_url);
    println!("Credentials: {:?}", config.credential_backend);
    match client.auth().validate_session().await? {
        Some(user) => println!("Session:     signed in as {} <{}>", user.display_name(), user.email),
        None => println!("Session:     signed out"),
    }
    Ok(())
}

fn print_user(user: &User, output: Output) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(user)?);
        return Ok(());
    }
    println!("{} ({})", user.display_name(), user.initials());
    println!("  email:    {}", user.email);
    println!("  handle:   {}", user.user_id);
    if let Some(ref avatar) = user.avatar_url {
        println!("  avatar:   {}", avatar);
    }
    if let Some(created) = user.created_at {
        println!("  joined:   {}", created.format("%Y-%m-%d"));
    }
    Ok(())
}

fn history_line(image: &GeneratedImage) -> String {
    let category = image
        .category
        .as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default();
    format!(
        "{}  {}  {}{}  ({} images)",
        image.id,
        image.created_at.format("%Y-%m-%d %H:%M"),
        image.effective_prompt(),
        category,
        image.image_urls.len()
    )
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::Write;

    eprint!("{}", prompt);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("No input given");
    }
    Ok(line)
}
