//! Query OMDb and print both the raw response and the mapped movies.
//! Usage:
//!   cargo run --bin omdb_props -- search <query> [page]
//!   cargo run --bin omdb_props -- movie <imdb_id>
//! Requires OMDB_API_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use marquee::omdb::{parse_detail, parse_search, OmdbClient, OMDB_BASE};
use serde_json::Value;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lookup {
    Search,
    Movie,
}

impl FromStr for Lookup {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "search" => Ok(Lookup::Search),
            "movie" => Ok(Lookup::Movie),
            _ => Err(anyhow::anyhow!("lookup must be 'search' or 'movie'")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let base = env::var("OMDB_BASE_URL").unwrap_or_else(|_| OMDB_BASE.to_string());
    let client = OmdbClient::new(env::var("OMDB_API_KEY").ok(), base);
    if !client.has_api_key() {
        anyhow::bail!("OMDB_API_KEY not set");
    }

    let mut args = env::args().skip(1);
    let lookup: Lookup = args
        .next()
        .context("usage: omdb_props <search|movie> <query|imdb_id> [page]")?
        .parse()?;
    let target = args.next().unwrap_or_default();

    let body = match lookup {
        Lookup::Search => {
            let page: u32 = match args.next() {
                Some(p) => p.parse().context("page must be a number")?,
                None => 1,
            };
            client.fetch_search_body(&target, page).await
        }
        Lookup::Movie => {
            if target.is_empty() {
                anyhow::bail!("movie lookup needs an imdb id");
            }
            client.fetch_detail_body(&target).await
        }
    }
    .context("request failed")?;

    let raw: Value = serde_json::from_str(&body).context("response is not JSON")?;
    println!("Raw response:\n{}", serde_json::to_string_pretty(&raw)?);

    println!("\nMapped:");
    match lookup {
        Lookup::Search => match parse_search(&body) {
            Ok(movies) if movies.is_empty() => println!("(no results)"),
            Ok(movies) => {
                for m in movies {
                    println!(
                        "- {} | {} | {} | poster: {}",
                        m.id,
                        m.title,
                        m.release_date,
                        m.poster_path.as_deref().unwrap_or("-")
                    );
                }
            }
            Err(e) => println!("{e}"),
        },
        Lookup::Movie => match parse_detail(&body) {
            Ok(Some(m)) => println!("{}", serde_json::to_string_pretty(&m)?),
            Ok(None) => println!("(not found)"),
            Err(e) => println!("{e}"),
        },
    }
    Ok(())
}
