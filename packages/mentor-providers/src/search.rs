//! REST client for the managed search index that backs the knowledge base.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mentor_config::SearchProviderConfig;

use crate::{Error, Result};

const HNSW_CONFIG: &str = "career-hnsw-config";
const VECTOR_PROFILE: &str = "career-vector-profile";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
	/// Full-text query; `*` matches everything.
	pub search: String,
	pub filter: Option<String>,
	pub top: u32,
	/// Runs a hybrid query with semantic ranking and extractive captions when set.
	pub vector: Option<Vec<f32>>,
	pub count: bool,
	pub facets: Vec<String>,
	pub select: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
	pub document: Map<String, Value>,
	pub score: Option<f64>,
	pub reranker_score: Option<f64>,
	pub captions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
	pub count: Option<u64>,
	pub facets: BTreeMap<String, Vec<FacetValue>>,
	pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
	pub value: Value,
	pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexingOutcome {
	pub key: String,
	pub status: bool,
	#[serde(default, rename = "errorMessage")]
	pub error_message: Option<String>,
	#[serde(default, rename = "statusCode")]
	pub status_code: Option<u16>,
}

/// Creates the index or replaces its schema.
pub async fn create_or_update_index(cfg: &SearchProviderConfig, dimensions: u32) -> Result<()> {
	let path = format!("/indexes/{}", cfg.index_name);

	send(cfg, Method::PUT, &path, &index_schema(cfg, dimensions)).await?;

	Ok(())
}

/// Uploads documents with the `upload` action, returning one outcome per key.
pub async fn upload_documents(
	cfg: &SearchProviderConfig,
	documents: &[Value],
) -> Result<Vec<IndexingOutcome>> {
	let actions = documents
		.iter()
		.map(|doc| {
			let mut action = doc.as_object().cloned().unwrap_or_default();

			action.insert("@search.action".to_string(), Value::String("upload".to_string()));

			Value::Object(action)
		})
		.collect::<Vec<_>>();

	index_actions(cfg, actions).await
}

pub async fn delete_documents(
	cfg: &SearchProviderConfig,
	ids: &[String],
) -> Result<Vec<IndexingOutcome>> {
	let actions = ids
		.iter()
		.map(|id| serde_json::json!({ "@search.action": "delete", "id": id }))
		.collect::<Vec<_>>();

	index_actions(cfg, actions).await
}

pub async fn search(cfg: &SearchProviderConfig, request: &SearchRequest) -> Result<SearchResponse> {
	let path = format!("/indexes/{}/docs/search", cfg.index_name);
	let json = send(cfg, Method::POST, &path, &search_body(cfg, request)).await?;

	parse_search_response(json)
}

/// Builds an OData filter from document types and tags, quoting values.
///
/// Type terms are OR-ed together, tag terms are OR-ed together, and the two groups are AND-ed.
pub fn build_filter(document_types: &[&str], tags: &[&str]) -> Option<String> {
	let mut clauses = Vec::new();

	if !document_types.is_empty() {
		let terms = document_types
			.iter()
			.map(|kind| format!("document_type eq '{}'", escape_literal(kind)))
			.collect::<Vec<_>>();

		clauses.push(format!("({})", terms.join(" or ")));
	}
	if !tags.is_empty() {
		let terms = tags
			.iter()
			.map(|tag| format!("tags/any(t: t eq '{}')", escape_literal(tag)))
			.collect::<Vec<_>>();

		clauses.push(format!("({})", terms.join(" or ")));
	}

	if clauses.is_empty() { None } else { Some(clauses.join(" and ")) }
}

pub(crate) fn index_schema(cfg: &SearchProviderConfig, dimensions: u32) -> Value {
	serde_json::json!({
		"name": cfg.index_name,
		"fields": [
			{ "name": "id", "type": "Edm.String", "key": true, "filterable": true },
			{ "name": "title", "type": "Edm.String", "searchable": true },
			{ "name": "content", "type": "Edm.String", "searchable": true },
			{ "name": "summary", "type": "Edm.String", "searchable": true },
			{
				"name": "document_type",
				"type": "Edm.String",
				"filterable": true,
				"facetable": true
			},
			{
				"name": "tags",
				"type": "Collection(Edm.String)",
				"filterable": true,
				"facetable": true
			},
			{ "name": "metadata", "type": "Edm.String" },
			{ "name": "source_url", "type": "Edm.String" },
			{ "name": "author", "type": "Edm.String", "filterable": true },
			{
				"name": "created_at",
				"type": "Edm.DateTimeOffset",
				"filterable": true,
				"sortable": true
			},
			{
				"name": "updated_at",
				"type": "Edm.DateTimeOffset",
				"filterable": true,
				"sortable": true
			},
			{
				"name": cfg.vector_field,
				"type": "Collection(Edm.Single)",
				"searchable": true,
				"dimensions": dimensions,
				"vectorSearchProfile": VECTOR_PROFILE
			}
		],
		"vectorSearch": {
			"algorithms": [
				{
					"name": HNSW_CONFIG,
					"kind": "hnsw",
					"hnswParameters": {
						"m": 4,
						"efConstruction": 400,
						"efSearch": 500,
						"metric": "cosine"
					}
				}
			],
			"profiles": [{ "name": VECTOR_PROFILE, "algorithm": HNSW_CONFIG }]
		},
		"semantic": {
			"configurations": [
				{
					"name": cfg.semantic_configuration,
					"prioritizedFields": {
						"titleField": { "fieldName": "title" },
						"prioritizedContentFields": [
							{ "fieldName": "content" },
							{ "fieldName": "summary" }
						],
						"prioritizedKeywordsFields": [{ "fieldName": "tags" }]
					}
				}
			]
		}
	})
}

pub(crate) fn search_body(cfg: &SearchProviderConfig, request: &SearchRequest) -> Value {
	let mut body = Map::new();

	body.insert("search".to_string(), Value::String(request.search.clone()));
	body.insert("top".to_string(), Value::from(request.top));

	if let Some(filter) = &request.filter {
		body.insert("filter".to_string(), Value::String(filter.clone()));
	}
	if request.count {
		body.insert("count".to_string(), Value::Bool(true));
	}
	if !request.facets.is_empty() {
		body.insert("facets".to_string(), Value::from(request.facets.clone()));
	}
	if !request.select.is_empty() {
		body.insert("select".to_string(), Value::String(request.select.join(",")));
	}
	if let Some(vector) = &request.vector {
		body.insert("queryType".to_string(), Value::String("semantic".to_string()));
		body.insert(
			"semanticConfiguration".to_string(),
			Value::String(cfg.semantic_configuration.clone()),
		);
		body.insert("captions".to_string(), Value::String("extractive".to_string()));
		body.insert(
			"vectorQueries".to_string(),
			serde_json::json!([{
				"kind": "vector",
				"vector": vector,
				"k": request.top,
				"fields": cfg.vector_field,
			}]),
		);
	}

	Value::Object(body)
}

fn parse_search_response(json: Value) -> Result<SearchResponse> {
	let values = json.get("value").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Search response is missing value array.".to_string() }
	})?;
	let mut hits = Vec::with_capacity(values.len());

	for value in values {
		let Some(object) = value.as_object() else {
			return Err(Error::InvalidResponse {
				message: "Search hit must be an object.".to_string(),
			});
		};
		let mut document = Map::new();
		let mut score = None;
		let mut reranker_score = None;
		let mut captions = Vec::new();

		for (key, field) in object {
			match key.as_str() {
				"@search.score" => score = field.as_f64(),
				"@search.rerankerScore" => reranker_score = field.as_f64(),
				"@search.captions" => {
					captions = field
						.as_array()
						.map(|items| {
							items
								.iter()
								.filter_map(|item| item.get("text").and_then(|t| t.as_str()))
								.map(str::to_string)
								.collect()
						})
						.unwrap_or_default();
				},
				other if other.starts_with("@search.") => {},
				_ => {
					document.insert(key.clone(), field.clone());
				},
			}
		}

		hits.push(SearchHit { document, score, reranker_score, captions });
	}

	let count = json.get("@odata.count").and_then(|v| v.as_u64());
	let facets = match json.get("@search.facets") {
		Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())?,
		_ => BTreeMap::new(),
	};

	Ok(SearchResponse { count, facets, hits })
}

async fn index_actions(
	cfg: &SearchProviderConfig,
	actions: Vec<Value>,
) -> Result<Vec<IndexingOutcome>> {
	let path = format!("/indexes/{}/docs/index", cfg.index_name);
	let json = send(cfg, Method::POST, &path, &serde_json::json!({ "value": actions })).await?;
	let outcomes = json.get("value").cloned().ok_or_else(|| Error::InvalidResponse {
		message: "Indexing response is missing value array.".to_string(),
	})?;

	Ok(serde_json::from_value(outcomes)?)
}

async fn send(
	cfg: &SearchProviderConfig,
	method: Method,
	path: &str,
	body: &Value,
) -> Result<Value> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = crate::endpoint_url(&cfg.api_base, path, Some(&cfg.api_version));
	let res = client
		.request(method, url)
		.headers(crate::auth_headers("api_key", &cfg.api_key, &cfg.default_headers)?)
		.json(body)
		.send()
		.await?;

	// Index creation answers 204 with an empty body.
	if res.status() == reqwest::StatusCode::NO_CONTENT {
		return Ok(Value::Null);
	}

	crate::read_json(res).await
}

fn escape_literal(raw: &str) -> String {
	raw.replace('\'', "''")
}
