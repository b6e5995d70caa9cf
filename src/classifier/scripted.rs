use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{ClassificationPrompt, Classifier, ClassifierError};

/// One canned answer.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail with a transport error carrying this message.
    Fail(String),
    /// Never answer, so the caller's timeout fires.
    Stall,
}

/// In-memory classifier that replays canned replies in order and records
/// the prompts it received.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<ClassificationPrompt>>,
}

impl ScriptedClassifier {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(text: impl Into<String>) -> Self {
        Self::new([ScriptedReply::Text(text.into())])
    }

    pub fn prompts(&self) -> Vec<ClassificationPrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, prompt: &ClassificationPrompt) -> Result<String, ClassifierError> {
        self.prompts.lock().push(prompt.clone());
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(ClassifierError::Transport(message)),
            Some(ScriptedReply::Stall) => std::future::pending().await,
            None => Err(ClassifierError::EmptyResponse),
        }
    }
}
