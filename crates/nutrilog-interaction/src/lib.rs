//! API clients for the NUTRILOG engine: the LLM meal parser, the
//! vision OCR client and the nutrition catalog client.

pub mod catalog_client;
pub mod config;
mod http;
pub mod llm_parser;
pub mod ocr_client;

pub use catalog_client::CatalogApiClient;
pub use llm_parser::LlmMealParser;
pub use ocr_client::LlmOcrClient;
