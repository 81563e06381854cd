//! mailsweep CLI - scan, review, and bulk-clean a Gmail mailbox
//!
//! Usage: mailsweep-cli <COMMAND>
//!
//! `scan` drives the whole pipeline: list messages, cluster them, label the
//! clusters, then an interactive review loop for archive/trash/delete.

use std::io::{BufRead, Write};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use mailsweep_lib::{
    ai_client, clustering::ClusterParams, labels::ClusterLabel, local_embeddings, mutation,
    processor, session::Session, settings, AnthropicClient, GmailClient, MailStore,
    MutationOutcome, RetryPolicy, Summarizer,
};

#[derive(Parser)]
#[command(name = "mailsweep-cli", version, about = "Semantic inbox clustering and bulk cleanup")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the mailbox, cluster it, and review clusters interactively
    Scan {
        /// Gmail search query (empty matches everything)
        #[arg(long, default_value = "")]
        query: String,
        /// Maximum messages to fetch
        #[arg(long, default_value_t = 2000)]
        max: usize,
    },
    /// Ask Claude how safe a single message is to delete
    Score {
        message_id: String,
    },
    /// Store the Anthropic API key in settings
    SetApiKey {
        key: String,
    },
    /// Store the Gmail access token in settings
    SetToken {
        token: String,
    },
    /// Show current settings (secrets redacted)
    Settings,
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

fn cluster_params() -> ClusterParams {
    let s = settings::current();
    ClusterParams {
        threshold_override: s.clustering_threshold,
        max_unsplit_size: s.max_unsplit_size,
        kmeans_seed: s.kmeans_seed,
    }
}

fn retry_policy() -> RetryPolicy {
    let s = settings::current();
    RetryPolicy {
        batch_size: s.delete_batch_size,
        batch_pause: std::time::Duration::from_millis(s.batch_pause_ms),
        ..RetryPolicy::default()
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "(set)" } else { "(not set)" }
}

/// Read one trimmed line; None means EOF or a broken stdin
fn prompt(line: &str) -> Option<String> {
    print!("{}", line);
    std::io::stdout().flush().ok()?;
    let mut input = String::new();
    match std::io::stdin().lock().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

fn confirm(question: &str) -> bool {
    matches!(
        prompt(&format!("{} [y/N] ", question)).as_deref(),
        Some("y") | Some("Y")
    )
}

fn print_cluster_line(id: i32, size: usize, label: &ClusterLabel) {
    println!("  [{}] {} - {} emails", id, label.label, size);
    if !label.summary.is_empty() {
        println!("      {}", label.summary);
    }
}

async fn list_clusters(session: &mut Session, summarizer: &dyn Summarizer) {
    println!("Clusters ({}):", session.clusters.len());
    let ids: Vec<(i32, usize)> = session.clusters.iter().map(|c| (c.id, c.len())).collect();
    for (id, size) in ids {
        if let Some(label) = session.label_for(summarizer, id).await {
            print_cluster_line(id, size, &label);
        }
    }
}

fn show_cluster(session: &Session, id: i32) {
    let Some(cluster) = session.cluster(id) else {
        println!("No cluster {}", id);
        return;
    };
    for mid in cluster.message_ids.iter().take(10) {
        if let Some(meta) = session.messages.get(mid) {
            println!("  {} | {} | {}", mid, meta.from, meta.subject);
        }
    }
    if cluster.len() > 10 {
        println!("  ... and {} more", cluster.len() - 10);
    }
}

/// Drop mutated ids from the session when the whole group went through.
/// On partial failure the view may disagree with the mailbox until the next
/// scan, so nothing is removed.
fn apply_outcome(session: &mut Session, ids: &[String], outcome: MutationOutcome, action: &str) {
    println!(
        "{}: {} succeeded, {} failed",
        action, outcome.success_count, outcome.failure_count
    );
    if outcome.failure_count == 0 {
        session.remove_messages(ids);
    } else {
        println!("Partial failure - run `scan` again to resync the view.");
    }
}

async fn score_message(store: &dyn MailStore, summarizer: &dyn Summarizer, message_id: &str) {
    let raw = match store.get_raw_body(message_id).await {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Failed to fetch message: {}", e);
            return;
        }
    };
    let text = match processor::extract_plaintext_from_raw(&raw) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to extract body: {}", e);
            return;
        }
    };
    match summarizer.score_deletion_safety(&text).await {
        Ok(response) => match ai_client::parse_safe_delete(&response) {
            Some(score) => {
                println!("Safe-delete score: {:.2}", score.score);
                println!("Reason: {}", score.reason);
            }
            None => println!("Unstructured response:\n{}", response),
        },
        Err(e) => eprintln!("Scoring failed: {}", e),
    }
}

async fn review_loop(session: &mut Session, store: &GmailClient, summarizer: &AnthropicClient) {
    let policy = retry_policy();
    println!("\nCommands: list | show N | archive N | trash N | delete N | score ID | quit");

    loop {
        let Some(input) = prompt("> ") else { break };
        if input.is_empty() {
            continue;
        }
        let mut words = input.split_whitespace();
        let command = words.next().unwrap_or_default();
        let arg = words.next().map(|s| s.to_string());

        match (command, arg) {
            ("list", _) => list_clusters(session, summarizer).await,
            ("show", Some(n)) => {
                if let Ok(id) = n.parse::<i32>() {
                    show_cluster(session, id);
                }
            }
            ("archive", Some(n)) => {
                let Some(ids) = cluster_ids(session, &n) else { continue };
                let outcome = mutation::bulk_archive(store, &ids, &policy).await;
                apply_outcome(session, &ids, outcome, "Archive");
            }
            ("trash", Some(n)) => {
                let Some(ids) = cluster_ids(session, &n) else { continue };
                if confirm(&format!("Move {} messages to trash?", ids.len())) {
                    let outcome = mutation::bulk_trash(store, &ids, &policy).await;
                    apply_outcome(session, &ids, outcome, "Trash");
                }
            }
            ("delete", Some(n)) => {
                let Some(ids) = cluster_ids(session, &n) else { continue };
                if confirm(&format!(
                    "PERMANENTLY delete {} messages? This is irreversible.",
                    ids.len()
                )) {
                    let outcome = mutation::bulk_delete_with_retry(store, &ids, &policy).await;
                    apply_outcome(session, &ids, outcome, "Delete");
                }
            }
            ("score", Some(mid)) => score_message(store, summarizer, &mid).await,
            ("quit", _) | ("q", _) | ("exit", _) => break,
            _ => println!("Unknown command"),
        }
    }
}

fn cluster_ids(session: &Session, arg: &str) -> Option<Vec<String>> {
    let id = match arg.parse::<i32>() {
        Ok(id) => id,
        Err(_) => {
            println!("Expected a cluster number");
            return None;
        }
    };
    match session.cluster(id) {
        Some(cluster) => Some(cluster.message_ids.clone()),
        None => {
            println!("No cluster {}", id);
            None
        }
    }
}

async fn run_scan(query: &str, max: usize) -> Result<(), String> {
    let store = GmailClient::new();
    let summarizer = AnthropicClient::new();
    let embedder = local_embeddings::get_embedder()?;

    let mut session = Session::new();
    let outcome = session.scan(&store, embedder, query, max, &cluster_params()).await?;
    let _ = settings::record_scan_run();
    println!(
        "Fetched {} messages into {} clusters.",
        outcome.messages_fetched, outcome.clusters_formed
    );

    if !ai_client::is_available() {
        println!("Note: ANTHROPIC_API_KEY not set; clusters of 3+ get placeholder labels.");
    }
    list_clusters(&mut session, &summarizer).await;
    review_loop(&mut session, &store, &summarizer).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    settings::init_default();
    let cli = Cli::parse();

    let result: Result<(), String> = match cli.command {
        Commands::Scan { query, max } => run_scan(&query, max).await,
        Commands::Score { message_id } => {
            let store = GmailClient::new();
            let summarizer = AnthropicClient::new();
            score_message(&store, &summarizer, &message_id).await;
            Ok(())
        }
        Commands::SetApiKey { key } => settings::set_api_key(&key),
        Commands::SetToken { token } => settings::set_gmail_token(&token),
        Commands::Settings => {
            let s = settings::current();
            println!("anthropic_api_key: {}", redact(&s.anthropic_api_key));
            println!("gmail_access_token: {}", redact(&s.gmail_access_token));
            println!("anthropic_model: {}", s.anthropic_model);
            println!("clustering_threshold: {:?}", s.clustering_threshold);
            println!("max_unsplit_size: {}", s.max_unsplit_size);
            println!("kmeans_seed: {}", s.kmeans_seed);
            println!("delete_batch_size: {}", s.delete_batch_size);
            println!("batch_pause_ms: {}", s.batch_pause_ms);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
