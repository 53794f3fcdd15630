use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = mentor_seeder::Args::parse();

	mentor_seeder::run(args).await
}
