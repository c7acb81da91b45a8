//! Outbound mail and SMS dispatch.
//!
//! Auth flows never block on delivery: they submit an [`OutboundMessage`] to
//! an in-process queue and get back a job id. A background worker drains the
//! queue and hands each message to a [`MailSender`] or [`SmsSender`],
//! retrying failures with exponential backoff and jitter until a max-attempt
//! threshold. Delivery success or failure is observed through logs, not the
//! request path.
//!
//! The default senders for local dev log the payload and return `Ok`.

use anyhow::{Context, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

/// A message waiting for out-of-band delivery.
#[derive(Clone, Debug)]
pub enum OutboundMessage {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Sms {
        to: String,
        body: String,
    },
}

/// Mail delivery abstraction used by the dispatch worker.
pub trait MailSender: Send + Sync {
    /// Deliver a message or return an error to trigger a retry.
    ///
    /// # Errors
    /// Returns an error when delivery fails.
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// SMS delivery abstraction used by the dispatch worker.
pub trait SmsSender: Send + Sync {
    /// Deliver a message or return an error to trigger a retry.
    ///
    /// # Errors
    /// Returns an error when delivery fails.
    fn send(&self, to: &str, body: &str) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailSender;

impl MailSender for LogMailSender {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to_email = %to, subject = %subject, body = %body, "mail dispatch stub");
        Ok(())
    }
}

/// Local dev sender that logs instead of sending real SMS.
#[derive(Clone, Debug)]
pub struct LogSmsSender;

impl SmsSender for LogSmsSender {
    fn send(&self, to: &str, body: &str) -> Result<()> {
        info!(to_mobile = %to, body = %body, "sms dispatch stub");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DispatchConfig {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl DispatchConfig {
    /// Default worker config: 5 max attempts, 2s->5m backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = self.backoff_base;
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct DispatchJob {
    id: Uuid,
    message: OutboundMessage,
}

/// Handle used by request handlers to submit work for delivery.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchJob>,
}

impl Dispatcher {
    /// Enqueue a message and return its job id immediately.
    ///
    /// # Errors
    /// Returns an error only when the worker has shut down.
    pub fn submit(&self, message: OutboundMessage) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.tx
            .send(DispatchJob { id, message })
            .context("dispatch worker is not running")?;
        Ok(id)
    }
}

/// Spawn the background delivery worker and return its submit handle.
pub fn spawn_dispatch_worker(
    mail: Arc<dyn MailSender>,
    sms: Arc<dyn SmsSender>,
    config: DispatchConfig,
) -> (Dispatcher, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<DispatchJob>();
    let config = config.normalize();

    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            deliver_with_retry(mail.as_ref(), sms.as_ref(), &job, &config).await;
        }
    });

    (Dispatcher { tx }, handle)
}

async fn deliver_with_retry(
    mail: &dyn MailSender,
    sms: &dyn SmsSender,
    job: &DispatchJob,
    config: &DispatchConfig,
) {
    for attempt in 1..=config.max_attempts() {
        let result = match &job.message {
            OutboundMessage::Email { to, subject, body } => mail.send(to, subject, body),
            OutboundMessage::Sms { to, body } => sms.send(to, body),
        };

        match result {
            Ok(()) => {
                info!(job_id = %job.id, attempt, "outbound message delivered");
                return;
            }
            Err(err) if attempt >= config.max_attempts() => {
                error!(job_id = %job.id, attempt, "outbound delivery failed permanently: {err}");
                return;
            }
            Err(err) => {
                error!(job_id = %job.id, attempt, "outbound delivery failed, retrying: {err}");
                sleep(backoff_delay(attempt, config.backoff_base, config.backoff_max)).await;
            }
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

/// Welcome mail enqueued after registration.
#[must_use]
pub fn welcome_email(to: &str) -> OutboundMessage {
    OutboundMessage::Email {
        to: to.to_string(),
        subject: "welcome mail".to_string(),
        body: "Your account has been created successfully.".to_string(),
    }
}

/// Login OTP mail; the code is valid for five minutes.
#[must_use]
pub fn login_otp_email(to: &str, code: &str) -> OutboundMessage {
    OutboundMessage::Email {
        to: to.to_string(),
        subject: "Login OTP".to_string(),
        body: format!("Your OTP for login is: {code}. It is valid for 5 minutes."),
    }
}

/// Login OTP over SMS; mirrors the email wording.
#[must_use]
pub fn login_otp_sms(to: &str, code: &str) -> OutboundMessage {
    OutboundMessage::Sms {
        to: to.to_string(),
        body: format!("Your OTP for login is: {code}. It is valid for 5 minutes."),
    }
}

/// Password-reset mail carrying the signed reset link.
#[must_use]
pub fn reset_password_email(to: &str, reset_url: &str) -> OutboundMessage {
    OutboundMessage::Email {
        to: to.to_string(),
        subject: "Forget Password".to_string(),
        body: format!("Click on this link to reset your password: {reset_url}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingMailSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MailSender for RecordingMailSender {
        fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
            self.sent
                .lock()
                .expect("sender lock")
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    struct FlakySmsSender {
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    impl SmsSender for FlakySmsSender {
        fn send(&self, _to: &str, _body: &str) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures_before_success {
                Err(anyhow!("transient delivery failure"))
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig::new()
            .with_max_attempts(3)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0)
    }

    #[tokio::test]
    async fn submitted_mail_is_delivered() -> Result<()> {
        let mail = Arc::new(RecordingMailSender::default());
        let (dispatcher, handle) =
            spawn_dispatch_worker(mail.clone(), Arc::new(LogSmsSender), fast_config());

        let job_id = dispatcher.submit(welcome_email("alice@example.com"))?;
        assert!(!job_id.is_nil());

        drop(dispatcher);
        handle.await?;

        let sent = mail.sent.lock().expect("sender lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@example.com");
        assert_eq!(sent[0].1, "welcome mail");
        Ok(())
    }

    #[tokio::test]
    async fn transient_sms_failures_are_retried() -> Result<()> {
        let sms = Arc::new(FlakySmsSender {
            failures_before_success: 2,
            attempts: AtomicU32::new(0),
        });
        let (dispatcher, handle) =
            spawn_dispatch_worker(Arc::new(LogMailSender), sms.clone(), fast_config());

        dispatcher.submit(login_otp_sms("5551234567", "123456"))?;
        drop(dispatcher);
        handle.await?;

        assert_eq!(sms.attempts.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn delivery_gives_up_after_max_attempts() -> Result<()> {
        let sms = Arc::new(FlakySmsSender {
            failures_before_success: u32::MAX,
            attempts: AtomicU32::new(0),
        });
        let (dispatcher, handle) =
            spawn_dispatch_worker(Arc::new(LogMailSender), sms.clone(), fast_config());

        dispatcher.submit(login_otp_sms("5551234567", "123456"))?;
        drop(dispatcher);
        handle.await?;

        assert_eq!(sms.attempts.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn submit_fails_once_worker_is_gone() -> Result<()> {
        let (dispatcher, handle) = spawn_dispatch_worker(
            Arc::new(LogMailSender),
            Arc::new(LogSmsSender),
            fast_config(),
        );
        handle.abort();
        let _ = handle.await;

        // The channel closes with the worker; submission must surface that.
        assert!(dispatcher.submit(welcome_email("alice@example.com")).is_err());
        Ok(())
    }

    #[test]
    fn normalize_raises_degenerate_values() {
        let config = DispatchConfig::new()
            .with_max_attempts(0)
            .with_backoff_base_seconds(10)
            .with_backoff_max_seconds(1)
            .normalize();
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_base, Duration::from_secs(10));
        assert_eq!(config.backoff_max, Duration::from_secs(10));
    }

    #[test]
    fn backoff_delay_is_capped_by_max() {
        let delay = backoff_delay(10, Duration::from_secs(5), Duration::from_secs(30));
        assert!(delay <= Duration::from_secs(30));
    }
}
