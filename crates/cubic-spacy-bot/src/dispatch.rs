use std::sync::Arc;

use cubic_spacy_api::{answer_update, deliver_answer, InlineAnswerer, Update};
use tokio_util::task::TaskTracker;

/// Answers each update on its own task.
#[derive(Clone)]
pub struct Dispatcher {
    answerer: Arc<dyn InlineAnswerer>,
    tasks: TaskTracker,
}

impl Dispatcher {
    #[must_use]
    pub fn new(answerer: Arc<dyn InlineAnswerer>, tasks: TaskTracker) -> Self {
        Self { answerer, tasks }
    }

    pub fn dispatch(&self, update: Update) {
        let answerer = Arc::clone(&self.answerer);
        self.tasks.spawn(async move {
            // ThreadRng is not Send; it must be gone before the first await.
            let answer = {
                let mut rng = rand::thread_rng();
                answer_update(&update, &mut rng)
            };
            if let Some(answer) = answer {
                deliver_answer(answerer.as_ref(), &answer).await;
            }
        });
    }

    /// Stop accepting work and wait for in-flight answers.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}
