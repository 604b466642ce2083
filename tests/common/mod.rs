// Shared helpers for integration tests
#![allow(dead_code)]

use pdf_rag::conversation::{ChatMessage, ChatModel, GenerationOptions};
use pdf_rag::embeddings::Embedder;
use pdf_rag::extract::PageDescriber;
use pdf_rag::{RagError, Result};
use std::sync::Mutex;

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

/// Deterministic bag-of-words embedder
pub struct HashEmbedder {
    pub dimension: usize,
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "hash"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word.to_lowercase().bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

/// Chat model that echoes how many messages it was sent and records them
#[derive(Default)]
pub struct RecordingChat {
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ChatModel for RecordingChat {
    fn generate(&self, messages: &[ChatMessage], _options: &GenerationOptions) -> Result<String> {
        let mut requests = self.requests.lock().expect("requests lock");
        requests.push(messages.to_vec());
        Ok(format!("answer from {} messages", messages.len()))
    }
}

/// Treats page "images" as UTF-8 text
pub struct TextDescriber;

impl PageDescriber for TextDescriber {
    fn describe_page(&self, image: &[u8]) -> Result<String> {
        String::from_utf8(image.to_vec())
            .map_err(|e| RagError::ExternalService(format!("Unreadable page: {e}")))
    }
}
