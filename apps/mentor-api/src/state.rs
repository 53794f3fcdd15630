use mentor_service::MentorService;

#[derive(Clone)]
pub struct AppState {
	pub service: MentorService,
}
impl AppState {
	/// Builds the service and prepares the search index.
	///
	/// Index preparation is best-effort; the API still serves plain chat without it.
	pub async fn new(config: mentor_config::Config) -> color_eyre::Result<Self> {
		let service = MentorService::new(config)?;

		if !service.initialize_index().await {
			tracing::warn!(
				"Search index is not ready. Knowledge retrieval will return no sources."
			);
		}

		Ok(Self { service })
	}

	pub fn from_service(service: MentorService) -> Self {
		Self { service }
	}
}
