//! Sample loop shared by the single-pass metrics.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::scoring::ScoreTrace;
use super::{estimate_tokens, MetricResult, PromptExecutor, Sample, SampleObserver, SampleResult};
use crate::error::PromptError;
use crate::utils::run_with_deadline;

pub(crate) const NO_SAMPLES: &str = "no samples available for evaluation";
pub(crate) const ALL_SAMPLES_FAILED: &str = "all samples failed";

/// How a metric turns samples into prompts and responses into scores.
pub(crate) struct StandardExecution<'a> {
    pub metric_id: &'static str,
    pub metric_name: &'static str,
    pub timeout: Duration,
    pub tools: &'static str,
    pub build_prompt: &'a (dyn Fn(&Sample) -> String + Send + Sync),
    pub score_response: &'a (dyn Fn(&str) -> ScoreTrace + Send + Sync),
}

/// A single prompt for a sample.
pub(crate) struct PromptJob<'a> {
    pub sample: &'a Sample,
    pub prompt: String,
    pub tools: &'a str,
    pub timeout: Duration,
}

/// Runs one prompt under its own deadline and scores the response.
pub(crate) async fn run_prompt(
    cancel: &CancellationToken,
    work_dir: &Path,
    executor: &dyn PromptExecutor,
    job: PromptJob<'_>,
    score_response: &(dyn Fn(&str) -> ScoreTrace + Send + Sync),
) -> SampleResult {
    let PromptJob {
        sample,
        prompt,
        tools,
        timeout,
    } = job;
    let started = Instant::now();
    let outcome = run_with_deadline(cancel, timeout, |token| {
        let prompt = &prompt;
        async move {
            executor
                .execute_prompt(&token, work_dir, prompt, tools, timeout)
                .await
        }
    })
    .await;

    let mut result = SampleResult {
        sample: sample.clone(),
        duration: started.elapsed(),
        ..Default::default()
    };
    match outcome.value {
        Ok(response) => {
            let trace = score_response(&response);
            result.score = trace.final_score;
            result.score_trace = trace;
            result.response = response;
        }
        // The executor only sees its token cancelled, so the sample deadline
        // decides the classification.
        Err(_) if outcome.timed_out => {
            result.error = Some(PromptError::TimedOut(timeout).to_string());
        }
        Err(e) => {
            result.error = Some(e.to_string());
        }
    }
    result.prompt = prompt;
    result
}

/// Runs every sample in order and averages the successful scores.
pub(crate) async fn execute_standard_metric(
    cancel: &CancellationToken,
    work_dir: &Path,
    samples: &[Sample],
    executor: &dyn PromptExecutor,
    observer: Option<&dyn SampleObserver>,
    cfg: StandardExecution<'_>,
) -> MetricResult {
    let started = Instant::now();
    let mut result = MetricResult::new(cfg.metric_id, cfg.metric_name);

    if samples.is_empty() {
        result.error = Some(NO_SAMPLES.to_string());
        result.duration = started.elapsed();
        return result;
    }

    let per_sample = cfg.timeout / samples.len() as u32;
    let mut total = 0;
    let mut successes = 0;

    for (idx, sample) in samples.iter().enumerate() {
        let prompt = (cfg.build_prompt)(sample);
        let job = PromptJob {
            sample,
            prompt,
            tools: cfg.tools,
            timeout: per_sample,
        };
        let sr = run_prompt(cancel, work_dir, executor, job, cfg.score_response).await;

        result.tokens_used += estimate_tokens(sr.prompt.len() + sr.response.len());
        if sr.error.is_none() {
            total += sr.score;
            successes += 1;
        }
        debug!(
            metric_id = cfg.metric_id,
            sample = idx,
            score = sr.score,
            failed = sr.error.is_some(),
            "Sample evaluated"
        );
        result.samples.push(sr);
        if let Some(observer) = observer {
            observer.on_sample(cfg.metric_id, idx + 1);
        }
    }

    result.duration = started.elapsed();
    if successes == 0 {
        result.error = Some(ALL_SAMPLES_FAILED.to_string());
        return result;
    }
    result.score = total / successes;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::{RecordingObserver, ScriptedExecutor};

    fn trace_for(response: &str) -> ScoreTrace {
        let mut trace = ScoreTrace::new(0);
        trace.push("len", true, response.len() as i32);
        trace.finish()
    }

    fn prompt_for(sample: &Sample) -> String {
        format!("look at {}", sample.file_path)
    }

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                file_path: format!("f{i}.go"),
                ..Default::default()
            })
            .collect()
    }

    fn cfg<'a>(
        build: &'a (dyn Fn(&Sample) -> String + Send + Sync),
        score: &'a (dyn Fn(&str) -> ScoreTrace + Send + Sync),
    ) -> StandardExecution<'a> {
        StandardExecution {
            metric_id: "m",
            metric_name: "M",
            timeout: Duration::from_secs(90),
            tools: "Read",
            build_prompt: build,
            score_response: score,
        }
    }

    #[tokio::test]
    async fn test_no_samples() {
        let exec = ScriptedExecutor::new(vec![]);
        let result = execute_standard_metric(
            &CancellationToken::new(),
            Path::new(""),
            &[],
            &exec,
            None,
            cfg(&prompt_for, &trace_for),
        )
        .await;
        assert_eq!(result.error.as_deref(), Some(NO_SAMPLES));
        assert_eq!(result.score, 0);
        assert_eq!(exec.calls(), 0);
    }

    #[tokio::test]
    async fn test_average_over_successes_and_budget_split() {
        let exec = ScriptedExecutor::new(vec![Ok("abcd"), Err("boom"), Ok("ab")]);
        let observer = RecordingObserver::default();
        let result = execute_standard_metric(
            &CancellationToken::new(),
            Path::new("/w"),
            &samples(3),
            &exec,
            Some(&observer),
            cfg(&prompt_for, &trace_for),
        )
        .await;

        assert!(result.error.is_none());
        assert_eq!(result.score, 3);
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.samples[1].score, 0);
        assert_eq!(result.samples[1].error.as_deref(), Some("execution failed: boom"));
        assert_eq!(result.samples[0].prompt, "look at f0.go");
        assert!(result.tokens_used > 0);

        let prompts = exec.prompts.lock().unwrap();
        assert!(prompts.iter().all(|(_, tools, t)| tools == "Read" && *t == Duration::from_secs(30)));

        let events = observer.events.lock().unwrap();
        let counts: Vec<_> = events.iter().map(|(_, c)| *c).collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    /// Waits for cancellation and reports it the way a killed subprocess would.
    struct Stalled;

    #[async_trait::async_trait]
    impl PromptExecutor for Stalled {
        async fn execute_prompt(
            &self,
            cancel: &CancellationToken,
            _work_dir: &Path,
            _prompt: &str,
            _tools: &str,
            _timeout: Duration,
        ) -> Result<String, PromptError> {
            cancel.cancelled().await;
            Err(PromptError::Execution("command cancelled".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sample_deadline_is_reported_as_timeout() {
        let sample = Sample {
            file_path: "slow.go".to_string(),
            ..Default::default()
        };
        let job = PromptJob {
            sample: &sample,
            prompt: "look at slow.go".to_string(),
            tools: "Read",
            timeout: Duration::from_millis(20),
        };
        let sr = run_prompt(&CancellationToken::new(), Path::new(""), &Stalled, job, &trace_for).await;

        assert_eq!(sr.error.as_deref(), Some("task timed out after 20ms"));
        assert_eq!(sr.score, 0);
        assert!(sr.response.is_empty());
    }

    #[tokio::test]
    async fn test_parent_cancel_is_not_a_timeout() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sample = Sample::default();
        let job = PromptJob {
            sample: &sample,
            prompt: String::new(),
            tools: "Read",
            timeout: Duration::from_secs(30),
        };
        let sr = run_prompt(&cancel, Path::new(""), &Stalled, job, &trace_for).await;
        assert_eq!(sr.error.as_deref(), Some("execution failed: command cancelled"));
    }

    #[tokio::test]
    async fn test_all_samples_failed() {
        let exec = ScriptedExecutor::new(vec![Err("a"), Err("b")]);
        let result = execute_standard_metric(
            &CancellationToken::new(),
            Path::new(""),
            &samples(2),
            &exec,
            None,
            cfg(&prompt_for, &trace_for),
        )
        .await;
        assert_eq!(result.error.as_deref(), Some(ALL_SAMPLES_FAILED));
        assert_eq!(result.score, 0);
        assert_eq!(result.samples.len(), 2);
    }
}
