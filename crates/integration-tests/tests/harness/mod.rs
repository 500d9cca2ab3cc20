#![allow(dead_code)]

pub mod mock_openai;

use colloquy_client::{ChatClient, ClientConfig};
use url::Url;

use self::mock_openai::MockOpenAi;

/// `OpenAI` configuration pointed at the mock
pub fn openai_config(mock: &MockOpenAi) -> ClientConfig {
    ClientConfig::openai("test-key")
        .with_default_model("mock-model")
        .with_default_embedding_model("mock-embedding")
        .with_base_url(Url::parse(&mock.base_url()).expect("valid URL"))
}

pub fn client(config: ClientConfig) -> ChatClient {
    ChatClient::new(config).expect("valid client configuration")
}
