use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use auth::LoginOutcome;
use auth::error::ClientResult;
use common::config::ClientConfig;
use library_client::error::notice;
use library_client::models::{ContactKind, Registration};
use library_client::{AppState, Navigation};

#[derive(Parser, Debug)]
#[command(name = "library-client", about = "Library loan service client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the catalog
    Books,
    /// Search the catalog by title
    Search { title: String },
    /// Show one book
    Book { id: i64 },
    /// Log in and store the session
    Login {
        #[arg(long, env = "LIBRARY_EMAIL")]
        email: String,
        #[arg(long, env = "LIBRARY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log out and clear the stored session
    Logout,
    /// Create an account; it must be activated from the emailed link
    Register {
        #[arg(long, env = "LIBRARY_EMAIL")]
        email: String,
        #[arg(long, env = "LIBRARY_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Date of birth, YYYY-MM-DD
        #[arg(long)]
        dob: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Activate an account with the token from its activation link
    Activate { token: String },
    /// Send the activation link again
    ResendActivation { email: String },
    /// Email a password reset link
    ResetPassword { email: String },
    /// Set the password of a first-login account
    SetInitialPassword { new_password: String },
    /// Show the logged-in account
    Profile,
    /// Change the password of the logged-in account
    ChangePassword { old_password: String, new_password: String },
    /// Request a new email or phone; a one-time password is sent to it
    ChangeContact { kind: Contact, value: String },
    /// Confirm a requested email or phone change
    VerifyContact {
        kind: Contact,
        value: String,
        otp: String,
    },
    /// List my loans
    Borrows,
    Borrow { book_id: i64 },
    Return { book_id: i64 },
    /// Administration: list books, optionally by title
    AdminBooks {
        #[arg(long)]
        search: Option<String>,
    },
    DeleteBook { id: i64 },
    /// Administration: list accounts, optionally by email
    Accounts {
        #[arg(long)]
        search: Option<String>,
    },
    DeleteAccount { id: i64 },
    /// Administration: activity log, or one entry of it
    Logs {
        id: Option<i64>,
        /// Only entries performed by a matching user
        #[arg(long, conflicts_with = "id")]
        search: Option<String>,
    },
    /// Administration: loans per title between two YYYY-MM-DD dates
    Report { from: String, to: String },
    /// Administration: show or switch maintenance mode
    Maintenance {
        #[arg(value_parser = ["on", "off"])]
        mode: Option<String>,
    },
    /// Show where a route leads for the current session
    Open { path: String },
    /// Keep the session validated until interrupted
    Watch,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Contact {
    Email,
    Phone,
}

impl From<Contact> for ContactKind {
    fn from(contact: Contact) -> Self {
        match contact {
            Contact::Email => ContactKind::Email,
            Contact::Phone => ContactKind::Phone,
        }
    }
}

impl Command {
    /// Route whose guard gates this command, if any
    fn route(&self) -> Option<&'static str> {
        match self {
            Command::Login { .. }
            | Command::Register { .. }
            | Command::ResendActivation { .. }
            | Command::ResetPassword { .. } => Some("/login"),
            Command::Profile
            | Command::ChangePassword { .. }
            | Command::ChangeContact { .. }
            | Command::VerifyContact { .. } => Some("/profile"),
            Command::Borrows | Command::Borrow { .. } | Command::Return { .. } => {
                Some("/my-borrows")
            }
            Command::AdminBooks { .. } | Command::DeleteBook { .. } => Some("/manage-books"),
            Command::Accounts { .. } | Command::DeleteAccount { .. } | Command::Logs { .. } => {
                Some("/manage-accounts")
            }
            Command::Maintenance { .. } | Command::Report { .. } => Some("/manage-systems"),
            Command::SetInitialPassword { .. } => Some("/force-change-password"),
            _ => None,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(state: &AppState, command: Command) -> ClientResult<()> {
    let library = state.library();
    match command {
        Command::Books => print_json(&library.books().await?),
        Command::Search { title } => print_json(&library.search_books(&title).await?),
        Command::Book { id } => print_json(&library.book(id).await?),
        Command::Login { email, password } => {
            match state.auth().login(&email, &password).await? {
                LoginOutcome::LoggedIn { role } => println!("Logged in as {}", role),
                LoginOutcome::PasswordChangeRequired => {
                    println!("First login: set a new password with `set-initial-password`")
                }
            }
            Ok(())
        }
        Command::Logout => {
            state.auth().logout().await?;
            println!("Logged out");
            Ok(())
        }
        Command::SetInitialPassword { new_password } => {
            state.auth().change_password_first_login(&new_password).await?;
            println!("Password changed, please log in again");
            Ok(())
        }
        Command::Register {
            email,
            password,
            first_name,
            last_name,
            dob,
            phone,
        } => {
            let registration = Registration {
                first_name,
                last_name,
                dob,
                phone,
                email,
                password,
            };
            let ack = library.register(&registration).await?;
            println!(
                "{}",
                ack.message
                    .unwrap_or_else(|| "Registered, check your email to activate the account".into())
            );
            Ok(())
        }
        Command::Activate { token } => print_json(&library.activate(&token).await?),
        Command::ResendActivation { email } => {
            let ack = library.resend_activation(&email).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Activation link sent".into()));
            Ok(())
        }
        Command::ResetPassword { email } => {
            let ack = library.reset_password(&email).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Password reset link sent".into()));
            Ok(())
        }
        Command::Profile => print_json(&library.my_info().await?),
        Command::ChangeContact { kind, value } => {
            let ack = library.request_contact_change(kind.into(), &value).await?;
            println!("{}", ack.message.unwrap_or_else(|| "One-time password sent".into()));
            Ok(())
        }
        Command::VerifyContact { kind, value, otp } => {
            let ack = library.verify_contact_change(kind.into(), &value, &otp).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Contact changed".into()));
            Ok(())
        }
        Command::ChangePassword {
            old_password,
            new_password,
        } => {
            let ack = library.change_password(&old_password, &new_password).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Password changed".into()));
            Ok(())
        }
        Command::Borrows => print_json(&library.borrowed_books().await?),
        Command::Borrow { book_id } => {
            let ack = library.borrow(book_id).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Borrowed".into()));
            Ok(())
        }
        Command::Return { book_id } => {
            let ack = library.return_book(book_id).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Returned".into()));
            Ok(())
        }
        Command::AdminBooks { search } => print_json(
            &library
                .search_admin_books(search.as_deref().unwrap_or_default())
                .await?,
        ),
        Command::DeleteBook { id } => {
            library.delete_book(id).await?;
            println!("Deleted book {}", id);
            Ok(())
        }
        Command::Accounts { search } => print_json(
            &library
                .search_accounts(search.as_deref().unwrap_or_default())
                .await?,
        ),
        Command::DeleteAccount { id } => {
            library.delete_account(id).await?;
            println!("Deleted account {}", id);
            Ok(())
        }
        Command::Logs { id: Some(id), .. } => print_json(&library.activity_log(id).await?),
        Command::Logs { id: None, search } => print_json(
            &library
                .search_activity_logs(search.as_deref().unwrap_or_default())
                .await?,
        ),
        Command::Report { from, to } => print_json(&library.borrowing_report(&from, &to).await?),
        Command::Maintenance { mode: None } => print_json(&library.system_config().await?),
        Command::Maintenance { mode: Some(mode) } => {
            library.set_maintenance_mode(mode == "on").await?;
            print_json(&library.system_config().await?)
        }
        Command::Open { .. } | Command::Watch => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load()?;
    let state = AppState::from_config(config).await?;

    if let Command::Watch = cli.command {
        let validator = state.start_validator().await?;
        info!("Watching session, press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        validator.shutdown().await?;
        return Ok(());
    }

    let outcome = state.validate().await?;
    info!("Session check: {:?}", outcome);

    if let Command::Open { path } = &cli.command {
        match state.navigate(path) {
            Navigation::Render(screen) => println!("{:?}", screen),
            Navigation::Redirect(to) => println!("redirect -> {}", to),
            Navigation::NotFound => println!("not found"),
        }
        return Ok(());
    }

    if let Some(route) = cli.command.route() {
        if let Navigation::Redirect(to) = state.navigate(route) {
            anyhow::bail!("{} is not available for this session (redirects to {})", route, to);
        }
    }

    if let Err(e) = run(&state, cli.command).await {
        let notice = notice(&e);
        error!("Command failed: {}", e);
        anyhow::bail!(notice.message);
    }
    Ok(())
}
