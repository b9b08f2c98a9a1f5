use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::TranslateError;
use crate::providers::{KeyRing, Provider};
use crate::retry::{RetryController, RetryPolicy};
use crate::translations::{TranslationBatch, TranslationMap, TranslationRequest};

pub(crate) const DEFAULT_BATCH_SIZE: usize = 50;

/// Translates whole namespaces, one supervised call per batch.
#[derive(Debug, Clone)]
pub struct Translator<P: Provider> {
    provider: P,
    policy: RetryPolicy,
    keys: Option<Arc<KeyRing>>,
    batch_size: usize,
    deadline: Option<Duration>,
}

impl<P: Provider> Translator<P> {
    pub fn new(provider: P, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            keys: None,
            batch_size: DEFAULT_BATCH_SIZE,
            deadline: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rotates through `keys` after each failed attempt. A batch gives up
    /// once it has failed on every key. Only takes effect with more than one
    /// key; a lone key retries without limit.
    pub fn with_key_rotation(mut self, keys: Arc<KeyRing>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Upper bound on the wall-clock time of one batch, retries included.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationMap, TranslateError> {
        let mut translated = TranslationMap::new();
        for (index, batch) in request
            .batches(self.batch_size)
            .into_iter()
            .enumerate()
        {
            let label = format!("{}#{}", request.namespace(), index + 1);
            translated.extend(self.translate_batch(batch, label).await?);
        }
        info!(
            namespace = request.namespace(),
            requested = request.len(),
            translated = translated.len(),
            "namespace translated"
        );
        Ok(translated)
    }

    async fn translate_batch(
        &self,
        batch: TranslationBatch,
        label: String,
    ) -> Result<TranslationMap, TranslateError> {
        let supervised = self.supervise(&batch, label);
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, supervised)
                .await
                .map_err(|_| TranslateError::Cancelled)?,
            None => supervised.await,
        }
    }

    async fn supervise(
        &self,
        batch: &TranslationBatch,
        label: String,
    ) -> Result<TranslationMap, TranslateError> {
        let mut controller = RetryController::new(self.policy.clone()).with_label(label);
        let operation = || self.provider.translate(batch.clone());
        match self.keys.as_ref().filter(|keys| keys.len() > 1) {
            Some(keys) => {
                let provider = self.provider.name().to_string();
                // every key gets one failed attempt per batch before giving up
                let mut rotations = 0;
                controller
                    .execute_with_escalation(operation, || {
                        if rotations + 1 >= keys.len() || !keys.rotate() {
                            return Ok(false);
                        }
                        rotations += 1;
                        info!(provider = %provider, "switched to next API key");
                        Ok(true)
                    })
                    .await
            }
            None => controller.execute(operation).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Outcome = Result<TranslationMap, TranslateError>;

    #[derive(Clone, Default)]
    struct ScriptedProvider {
        script: Arc<Mutex<VecDeque<Outcome>>>,
        seen: Arc<Mutex<Vec<TranslationBatch>>>,
    }

    impl ScriptedProvider {
        fn with_script(outcomes: Vec<Outcome>) -> Self {
            Self {
                script: Arc::new(Mutex::new(outcomes.into())),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn translate(&self, batch: TranslationBatch) -> ProviderFuture {
            self.seen.lock().unwrap().push(batch.clone());
            let next = self.script.lock().unwrap().pop_front();
            let outcome = next.unwrap_or_else(|| {
                Ok(batch
                    .entries
                    .iter()
                    .map(|(key, source)| (key.clone(), format!("T:{source}")))
                    .collect())
            });
            Box::pin(async move { outcome })
        }
    }

    fn quiet_policy() -> RetryPolicy {
        RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    fn request(count: usize) -> TranslationRequest {
        let mut request = TranslationRequest::new("examplemod");
        for i in 0..count {
            request.push(format!("key.{i}"), format!("Value {i}"));
        }
        request
    }

    #[tokio::test(start_paused = true)]
    async fn merges_batches_in_order() {
        let provider = ScriptedProvider::default();
        let translator = Translator::new(provider.clone(), quiet_policy()).with_batch_size(2);
        let map = translator.translate(&request(5)).await.unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map["key.4"], "T:Value 4");
        let seen = provider.seen.lock().unwrap();
        let sizes: Vec<usize> = seen.iter().map(|b| b.entries.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_with_single_key() {
        let provider = ScriptedProvider::with_script(vec![
            Err(TranslateError::rate_limited("429")),
            Err(TranslateError::rate_limited("429")),
            Err(TranslateError::InvalidResponse("cut off".to_string())),
        ]);
        let keys = Arc::new(KeyRing::new(vec!["only".to_string()]));
        let translator =
            Translator::new(provider.clone(), quiet_policy()).with_key_rotation(keys.clone());
        let map = translator.translate(&request(1)).await.unwrap();
        assert_eq!(map["key.0"], "T:Value 0");
        assert_eq!(provider.calls(), 4);
        assert_eq!(keys.current(), Some("only"));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_every_key_failed() {
        let provider = ScriptedProvider::with_script(vec![
            Err(TranslateError::Service {
                status: 401,
                message: "bad key 1".to_string(),
            }),
            Err(TranslateError::Service {
                status: 401,
                message: "bad key 2".to_string(),
            }),
        ]);
        let keys = Arc::new(KeyRing::new(vec!["one".to_string(), "two".to_string()]));
        let translator =
            Translator::new(provider.clone(), quiet_policy()).with_key_rotation(keys.clone());
        let err = translator.translate(&request(1)).await.unwrap_err();
        match err {
            TranslateError::Service { message, .. } => assert_eq!(message, "bad key 2"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.calls(), 2);
        assert_eq!(keys.current(), Some("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn later_batches_start_with_a_full_set_of_keys() {
        let provider = ScriptedProvider::with_script(vec![
            Err(TranslateError::Service {
                status: 503,
                message: "unavailable".to_string(),
            }),
            Ok(TranslationMap::from([(
                "key.0".to_string(),
                "first".to_string(),
            )])),
            Err(TranslateError::rate_limited("slow down")),
        ]);
        let keys = Arc::new(KeyRing::new(vec!["one".to_string(), "two".to_string()]));
        let translator =
            Translator::new(provider.clone(), quiet_policy()).with_key_rotation(keys.clone());

        let first = translator.translate(&request(1)).await.unwrap();
        assert_eq!(first["key.0"], "first");
        assert_eq!(keys.current(), Some("two"));

        let second = translator.translate(&request(1)).await.unwrap();
        assert_eq!(second["key.0"], "T:Value 0");
        assert_eq!(provider.calls(), 4);
        assert_eq!(keys.current(), Some("one"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_endless_retries() {
        let outcomes = (0..1000)
            .map(|_| Err(TranslateError::rate_limited("slow down")))
            .collect();
        let provider = ScriptedProvider::with_script(outcomes);
        let translator = Translator::new(provider.clone(), quiet_policy())
            .with_deadline(Some(Duration::from_secs(10)));
        let err = translator.translate(&request(1)).await.unwrap_err();
        assert!(matches!(err, TranslateError::Cancelled));
        // waits of 1, 2 and 4 seconds fit before the deadline
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_aborts_namespace() {
        let provider =
            ScriptedProvider::with_script(vec![Err(TranslateError::Fatal("boom".to_string()))]);
        let translator = Translator::new(provider.clone(), quiet_policy()).with_batch_size(1);
        let err = translator.translate(&request(3)).await.unwrap_err();
        assert!(matches!(err, TranslateError::Fatal(_)));
        assert_eq!(provider.calls(), 1);
    }
}
