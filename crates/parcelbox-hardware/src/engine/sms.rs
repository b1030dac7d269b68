//! Strict FIFO queue of outbound SMS jobs.
//!
//! At most one job is in flight. A job completes when the bridge later
//! reports a success or failure marker, not when the `TXT:` line is written,
//! so the queue tracks its own deadline independently of the command engine.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use parcelbox_core::{PhoneNumber, SmsBody};
use parcelbox_protocol::DeviceCommand;

use crate::config::SmsRetention;
use crate::controller::deadline_after;
use crate::error::{DeviceError, Result};

#[derive(Debug)]
pub struct SmsJob {
    pub number: PhoneNumber,
    pub body: SmsBody,
    reply: oneshot::Sender<Result<()>>,
}

impl SmsJob {
    pub fn new(number: PhoneNumber, body: SmsBody) -> (Self, oneshot::Receiver<Result<()>>) {
        let (reply, rx) = oneshot::channel();
        (Self { number, body, reply }, rx)
    }

    fn line(&self) -> String {
        DeviceCommand::SendSms {
            number: self.number.clone(),
            body: self.body.clone(),
        }
        .encode()
    }

    /// Resolve the caller. A dropped receiver is not an error.
    pub fn resolve(self, outcome: Result<()>) {
        let _ = self.reply.send(outcome);
    }
}

#[derive(Debug)]
struct InFlight {
    job: SmsJob,
    deadline: Instant,
}

#[derive(Debug)]
pub struct SmsQueue {
    queue: VecDeque<SmsJob>,
    in_flight: Option<InFlight>,
    timeout: Duration,
}

impl SmsQueue {
    pub fn new(timeout: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            timeout,
        }
    }

    pub fn enqueue(&mut self, job: SmsJob) {
        debug!(number = %job.number, queued = self.queue.len(), "SMS queued");
        self.queue.push_back(job);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Start the next job if none is in flight and return its wire line.
    pub fn dispatch_next(&mut self, now: Instant) -> Option<String> {
        if self.in_flight.is_some() {
            return None;
        }
        loop {
            let job = self.queue.pop_front()?;
            match deadline_after(now, self.timeout) {
                Ok(deadline) => {
                    let line = job.line();
                    info!(number = %job.number, "Sending SMS");
                    self.in_flight = Some(InFlight { job, deadline });
                    return Some(line);
                }
                Err(e) => {
                    warn!(number = %job.number, error = %e, "SMS rejected");
                    job.resolve(Err(e));
                }
            }
        }
    }

    /// Resolve the in-flight job from a marker line.
    pub fn complete(&mut self, outcome: Result<()>) {
        match self.in_flight.take() {
            Some(in_flight) => {
                match &outcome {
                    Ok(()) => info!(number = %in_flight.job.number, "SMS sent"),
                    Err(e) => warn!(number = %in_flight.job.number, error = %e, "SMS failed"),
                }
                in_flight.job.resolve(outcome);
            }
            None => debug!("SMS marker without a job in flight"),
        }
    }

    /// Fail the in-flight job, e.g. because its write failed.
    pub fn fail_in_flight(&mut self, error: DeviceError) {
        if self.in_flight.is_some() {
            self.complete(Err(error));
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|in_flight| in_flight.deadline)
    }

    /// Fail the in-flight job if its deadline has passed.
    pub fn on_timeout(&mut self, now: Instant) {
        if self.deadline().is_some_and(|deadline| deadline <= now) {
            self.complete(Err(DeviceError::timeout(self.timeout)));
        }
    }

    /// Apply the retention policy after the link went away.
    ///
    /// The in-flight job always fails; queued jobs fail only under
    /// [`SmsRetention::DiscardOnDisconnect`].
    pub fn on_disconnect(&mut self, retention: SmsRetention) {
        self.fail_in_flight(DeviceError::NotConnected);
        if retention == SmsRetention::DiscardOnDisconnect {
            for job in self.queue.drain(..) {
                job.resolve(Err(DeviceError::NotConnected));
            }
        }
    }

    pub fn fail_all(&mut self, error: &DeviceError) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.job.resolve(Err(error.clone()));
        }
        for job in self.queue.drain(..) {
            job.resolve(Err(error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn job(body: &str) -> (SmsJob, oneshot::Receiver<Result<()>>) {
        SmsJob::new(
            PhoneNumber::new("+5511987654321").unwrap(),
            SmsBody::new(body).unwrap(),
        )
    }

    #[test]
    fn test_single_job_in_flight() {
        let mut queue = SmsQueue::new(TIMEOUT);
        let now = Instant::now();
        let (j1, mut r1) = job("first");
        let (j2, _r2) = job("second");
        queue.enqueue(j1);
        queue.enqueue(j2);

        assert_eq!(
            queue.dispatch_next(now).as_deref(),
            Some("TXT:+5511987654321:first")
        );
        assert_eq!(queue.dispatch_next(now), None);

        queue.complete(Ok(()));
        assert_eq!(r1.try_recv().unwrap(), Ok(()));
        assert_eq!(
            queue.dispatch_next(now).as_deref(),
            Some("TXT:+5511987654321:second")
        );
    }

    #[test]
    fn test_timeout_at_deadline() {
        let mut queue = SmsQueue::new(TIMEOUT);
        let now = Instant::now();
        let (j1, mut r1) = job("hi");
        queue.enqueue(j1);
        queue.dispatch_next(now);

        queue.on_timeout(now + Duration::from_millis(29_999));
        assert!(queue.is_in_flight());

        queue.on_timeout(now + TIMEOUT);
        assert_eq!(r1.try_recv().unwrap(), Err(DeviceError::timeout(TIMEOUT)));
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn test_out_of_range_timeout_rejects_job() {
        let mut queue = SmsQueue::new(Duration::MAX);
        let (j1, r1) = job("hi");
        let (j2, r2) = job("there");
        queue.enqueue(j1);
        queue.enqueue(j2);

        assert_eq!(queue.dispatch_next(Instant::now()), None);
        for mut rx in [r1, r2] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                Err(DeviceError::Validation { .. })
            ));
        }
        assert!(!queue.is_in_flight());
        assert_eq!(queue.queued_len(), 0);
    }

    #[test]
    fn test_disconnect_discards_queue() {
        let mut queue = SmsQueue::new(TIMEOUT);
        let (j1, mut r1) = job("a");
        let (j2, mut r2) = job("b");
        queue.enqueue(j1);
        queue.enqueue(j2);
        queue.dispatch_next(Instant::now());

        queue.on_disconnect(SmsRetention::DiscardOnDisconnect);
        assert_eq!(r1.try_recv().unwrap(), Err(DeviceError::NotConnected));
        assert_eq!(r2.try_recv().unwrap(), Err(DeviceError::NotConnected));
    }

    #[test]
    fn test_disconnect_retains_queued_jobs() {
        let mut queue = SmsQueue::new(TIMEOUT);
        let (j1, mut r1) = job("a");
        let (j2, _r2) = job("b");
        queue.enqueue(j1);
        queue.enqueue(j2);
        queue.dispatch_next(Instant::now());

        queue.on_disconnect(SmsRetention::RetainAcrossReconnect);
        assert_eq!(r1.try_recv().unwrap(), Err(DeviceError::NotConnected));
        assert_eq!(queue.queued_len(), 1);
        assert!(!queue.is_in_flight());
    }
}
