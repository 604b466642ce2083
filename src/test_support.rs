// Deterministic stand-ins for the model capabilities, shared by unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::conversation::{ChatMessage, ChatModel, GenerationOptions};
use crate::embeddings::Embedder;
use crate::extract::PageDescriber;
use crate::{RagError, Result};

/// Bag-of-words embedder using feature hashing into a fixed number of buckets
#[derive(Debug)]
pub(crate) struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hash-{dimension}"),
        }
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
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

/// Chat model returning scripted replies and recording every request
#[derive(Debug, Default)]
pub(crate) struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub(crate) fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatModel for ScriptedChat {
    fn generate(&self, messages: &[ChatMessage], _options: &GenerationOptions) -> Result<String> {
        let mut requests = self.requests.lock().expect("requests lock");
        requests.push(messages.to_vec());
        let call = requests.len();
        drop(requests);

        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok(format!("answer {call}")))
    }
}

/// Reads "page images" that are really UTF-8 text files
#[derive(Debug, Default)]
pub(crate) struct TextDescriber;

impl PageDescriber for TextDescriber {
    fn describe_page(&self, image: &[u8]) -> Result<String> {
        String::from_utf8(image.to_vec())
            .map_err(|e| RagError::ExternalService(format!("Unreadable page: {e}")))
    }
}
