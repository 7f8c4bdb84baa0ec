use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{Parser, Subcommand};
use glossmark::dom;
use glossmark::{Annotator, Glossary, SearchSession, TermRef, build_matchers};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};

#[cfg(feature = "web")]
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(
    name = "glossmark",
    about = "Annotate news articles with glossary terms",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Operations on glossary entries.
    #[command(subcommand)]
    Term(TermCommand),
    /// Annotate an HTML article and print the marked-up document.
    Annotate {
        /// HTML file to annotate.
        file: PathBuf,
        /// Glossary JSON file.
        #[arg(short, long)]
        glossary: PathBuf,
    },
    /// Highlight occurrences of a phrase inside an HTML article.
    Search {
        /// HTML file to search.
        file: PathBuf,
        /// Phrase to look for.
        query: String,
        /// Hit to put the cursor on, wrapping past the ends.
        #[arg(long)]
        cursor: Option<isize>,
    },
    /// Serve the annotated article over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// HTML file to serve.
        file: PathBuf,
        /// Glossary JSON file.
        #[arg(short, long)]
        glossary: PathBuf,
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum TermCommand {
    /// Resolve queries to glossary keys.
    Lookup {
        /// Glossary JSON file.
        #[arg(short, long)]
        glossary: PathBuf,
        /// One or more queries to resolve.
        #[arg(required = true)]
        queries: Vec<String>,
    },
    /// Show the full entry for a term.
    Show {
        /// Glossary JSON file.
        #[arg(short, long)]
        glossary: PathBuf,
        /// Term key, alias or pattern query.
        query: String,
    },
    /// List the news links for a term.
    News {
        /// Glossary JSON file.
        #[arg(short, long)]
        glossary: PathBuf,
        /// Term key, alias or pattern query.
        query: String,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Term(TermCommand::Lookup { glossary, queries }) => {
            handle_lookup(&glossary, queries, cli.json)
        }
        Command::Term(TermCommand::Show { glossary, query }) => {
            handle_show(&glossary, &query, cli.json)
        }
        Command::Term(TermCommand::News { glossary, query }) => {
            handle_news(&glossary, &query, cli.json)
        }
        Command::Annotate { file, glossary } => handle_annotate(&file, &glossary, cli.json),
        Command::Search {
            file,
            query,
            cursor,
        } => handle_search(&file, &query, cursor, cli.json),
        #[cfg(feature = "web")]
        Command::Serve {
            file,
            glossary,
            addr,
        } => handle_serve(&file, &glossary, addr),
    }
}

fn handle_lookup(
    glossary_path: &Path,
    queries: Vec<String>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let glossary = Glossary::from_path(glossary_path)?;
    let results: Vec<(String, Option<(String, String)>)> = queries
        .into_iter()
        .map(|query| {
            let hit = glossary
                .resolve(&query)
                .map(|term| (term.key().to_string(), term.title().to_string()));
            (query, hit)
        })
        .collect();

    if as_json {
        let payload: Vec<_> = results
            .iter()
            .map(|(query, hit)| {
                json!({
                    "query": query,
                    "key": hit.as_ref().map(|(key, _)| key),
                    "title": hit.as_ref().map(|(_, title)| title),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_lookup_table(&results);
    }
    Ok(())
}

fn handle_show(glossary_path: &Path, query: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let glossary = Glossary::from_path(glossary_path)?;
    let term = glossary
        .resolve(query)
        .ok_or_else(|| format!("No entry found for {query:?}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&term_to_json(&term))?);
    } else {
        print_term(&term);
    }
    Ok(())
}

fn handle_news(glossary_path: &Path, query: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let glossary = Glossary::from_path(glossary_path)?;
    let term = glossary
        .resolve(query)
        .ok_or_else(|| format!("No entry found for {query:?}"))?;
    let news = term.news();

    if as_json {
        let payload = json!({
            "key": term.key(),
            "title": term.title(),
            "news": &news[..],
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("News for {}:", term.title());
        for link in news.iter() {
            if link.title.is_empty() {
                println!("- {}", link.url);
            } else {
                println!("- {} <{}>", link.title, link.url);
            }
        }
    }
    Ok(())
}

fn handle_annotate(
    file: &Path,
    glossary_path: &Path,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let html = fs::read_to_string(file)?;
    let glossary = Glossary::from_path(glossary_path)?;
    let annotator = Annotator::new(build_matchers(&glossary));
    let mut document = dom::parse(&html);
    let markers = annotator.annotate(dom::article_root(&mut document));

    if as_json {
        let payload = json!({
            "markers": markers.iter().map(|m| {
                json!({ "index": m.index, "key": m.key, "text": m.text })
            }).collect::<Vec<_>>(),
            "html": dom::to_document_html(&document),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", dom::to_document_html(&document));
        eprintln!("{} markers produced", markers.len());
    }
    Ok(())
}

fn handle_search(
    file: &Path,
    query: &str,
    cursor: Option<isize>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let html = fs::read_to_string(file)?;
    let mut document = dom::parse(&html);
    let mut session = SearchSession::new(dom::article_root(&mut document).clone());
    session.set_query(query);
    if let Some(cursor) = cursor {
        session.focus(cursor);
    }

    if as_json {
        let payload = json!({
            "query": session.query(),
            "hits": session.hit_count(),
            "cursor": session.cursor(),
            "status": session.status(),
            "html": session.html(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", session.html());
        eprintln!("{}", session.status());
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    file: &Path,
    glossary_path: &Path,
    addr: SocketAddr,
) -> Result<(), Box<dyn Error>> {
    use glossmark::web;

    let article = fs::read_to_string(file)?;
    let glossary = Glossary::from_path(glossary_path)?;
    web::init_tracing();
    let config = web::WebConfig { addr };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(web::serve(config, glossary, &article))?;
    Ok(())
}

fn print_lookup_table(rows: &[(String, Option<(String, String)>)]) {
    if rows.is_empty() {
        println!("No queries provided.");
        return;
    }
    let width = rows
        .iter()
        .map(|(query, _)| query.chars().count())
        .max()
        .unwrap_or(5)
        .max("QUERY".len());
    println!("{:<width$}  {}", "QUERY", "KEY (TITLE)", width = width);
    println!("{:-<width$}  {}", "", "-----------", width = width);
    for (query, hit) in rows {
        let value = match hit {
            Some((key, title)) if key == title => key.clone(),
            Some((key, title)) => format!("{key} ({title})"),
            None => "<missing>".to_string(),
        };
        println!("{:<width$}  {}", query, value, width = width);
    }
}

fn term_to_json(term: &TermRef<'_>) -> serde_json::Value {
    json!({
        "key": term.key(),
        "title": term.title(),
        "memo": term.memo(),
        "who": term.who(),
        "topics": term.topics(),
        "pattern": term.pattern_source(),
        "news": &term.news()[..],
    })
}

fn print_term(term: &TermRef<'_>) {
    println!("Term: {} (key {})", term.title(), term.key());
    if let Some(who) = term.who() {
        println!("Who: {who}");
    }
    let topics = term.topics();
    if !topics.is_empty() {
        println!("Topics: {}", topics.join(", "));
    }
    if let Some(pattern) = term.pattern_source() {
        println!("Pattern: {pattern}");
    }
    if let Some(memo) = term.memo() {
        render_markdown_block("Memo", memo);
    }
    println!("\nNews:");
    for link in term.news().iter() {
        if link.title.is_empty() {
            println!("- {}", link.url);
        } else {
            println!("- {} <{}>", link.title, link.url);
        }
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
