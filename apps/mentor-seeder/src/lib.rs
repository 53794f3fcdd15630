use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use mentor_cli::ConfigArgs;
use mentor_domain::knowledge::{IndexingState, KnowledgeDocument};
use mentor_service::MentorService;

const BUILTIN_CORPUS: &str = include_str!("../corpus/career_knowledge.toml");

#[derive(Debug, Parser)]
#[command(
	version = mentor_cli::VERSION,
	rename_all = "kebab",
	styles = mentor_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub common: ConfigArgs,
	/// TOML file with `[[documents]]` entries. Defaults to the built-in career corpus.
	#[arg(long, value_name = "FILE")]
	pub documents: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Corpus {
	documents: Vec<KnowledgeDocument>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = mentor_config::load(&args.common.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let documents = match args.documents.as_deref() {
		Some(path) => load_documents(path)?,
		None => builtin_documents()?,
	};
	let service = MentorService::new(config)?;

	if !service.initialize_index().await {
		return Err(eyre::eyre!("Search index could not be initialized."));
	}

	tracing::info!(documents = documents.len(), "Seeding knowledge base.");

	let status = service.index_documents_batch(documents).await;

	println!("{}", serde_json::to_string_pretty(&status)?);

	if status.documents_failed > 0 || status.status != IndexingState::Completed {
		for message in status.error_messages.iter().take(5) {
			tracing::error!(error = %message, "Document failed to index.");
		}

		return Err(eyre::eyre!(
			"{} of {} documents failed to index.",
			status.documents_failed,
			status.documents_processed
		));
	}

	tracing::info!(indexed = status.documents_successful, "Knowledge base seeded.");

	Ok(())
}

pub fn builtin_documents() -> color_eyre::Result<Vec<KnowledgeDocument>> {
	parse_corpus(BUILTIN_CORPUS)
}

pub fn load_documents(path: &Path) -> color_eyre::Result<Vec<KnowledgeDocument>> {
	let raw = std::fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read {}: {err}.", path.display()))?;

	parse_corpus(&raw)
}

fn parse_corpus(raw: &str) -> color_eyre::Result<Vec<KnowledgeDocument>> {
	let corpus: Corpus = toml::from_str(raw)?;

	if corpus.documents.is_empty() {
		return Err(eyre::eyre!("Document file contains no documents."));
	}

	corpus
		.documents
		.into_iter()
		.map(|document| {
			let title = document.title.clone();

			document.normalized().map_err(|err| eyre::eyre!("Invalid document {title:?}: {err}."))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use mentor_domain::knowledge::DocumentType;

	use super::*;

	#[test]
	fn builtin_corpus_is_valid() {
		let documents = builtin_documents().expect("Built-in corpus must parse.");
		let kinds: BTreeSet<_> = documents.iter().map(|document| document.document_type).collect();

		assert_eq!(documents.len(), 6);
		assert!(kinds.contains(&DocumentType::CareerGuide));
		assert!(kinds.contains(&DocumentType::SalaryData));
		assert!(documents.iter().all(|document| !document.tags.is_empty()));
		assert!(documents.iter().all(|document| document.author.is_some()));
	}

	#[test]
	fn documents_get_distinct_ids() {
		let documents = builtin_documents().expect("Built-in corpus must parse.");
		let ids: BTreeSet<_> = documents.iter().map(|document| document.id.as_str()).collect();

		assert_eq!(ids.len(), documents.len());
	}

	#[test]
	fn empty_file_is_rejected() {
		let err = parse_corpus("documents = []").expect_err("Empty corpus must be rejected.");

		assert!(err.to_string().contains("no documents"));
	}

	#[test]
	fn oversized_title_is_rejected() {
		let raw = format!(
			"[[documents]]\ntitle = \"{}\"\ncontent = \"c\"\nsummary = \"s\"\ndocument_type = \"career_guide\"\n",
			"t".repeat(250)
		);
		let err = parse_corpus(&raw).expect_err("Oversized title must be rejected.");

		assert!(err.to_string().contains("Invalid document"));
	}
}
