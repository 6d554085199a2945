//! Software timer queue driven by the screen's main loop.
//!
//! The queue holds any number of periodic timers, each owned by a job, plus a
//! single one-shot countdown.  The main loop asks [`TimerQueue::next_timeout`]
//! how long it may block, and calls [`TimerQueue::process`] after every wake
//! up.  `process` only *collects* due jobs; the caller runs them after
//! releasing whatever lock guards the queue, so a job may freely re-enter the
//! queue (add or remove timers) from its `run`.
//!
//! # How the countdowns work (for beginners)
//!
//! Instead of storing absolute deadlines, every timer stores the time it has
//! left.  Each `process` call reads the time elapsed since the previous call
//! and subtracts it from *every* timer.  Subtracting the same amount from all
//! entries never changes their relative order, so the queue stays sorted
//! without re-sorting.  A freshly added timer also remembers how far the clock
//! had already advanced when it was added; its first decrement subtracts only
//! the time since then.
//!
//! When a periodic timer reaches zero its job is collected and its countdown
//! is reset to the full period.  Overflow is discarded: a timer fires at most
//! once per `process` call, however late the call is.
//!
//! # Known limitations
//!
//! - Only one one-shot timer can be outstanding.  [`TimerQueue::add_one_shot`]
//!   replaces any earlier one and always returns [`ONE_SHOT_TIMER_ID`].
//! - Jobs collected in one batch all run, in order, even if an earlier job in
//!   the batch removes a later job's timer.  Jobs must not remove other jobs'
//!   timers from within their own `run`.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tracing::trace;

/// Identifier returned for every one-shot timer.
pub const ONE_SHOT_TIMER_ID: u32 = 0;

/// Shortest period accepted; zero would make a timer fire forever.
const MIN_PERIOD_SECS: f64 = 1.0e-6;

// ── Clocks ────────────────────────────────────────────────────────────────────

/// Source of elapsed time for a [`TimerQueue`].
pub trait Clock: Send {
    /// Time elapsed since construction or the last [`Clock::reset`].
    fn elapsed(&self) -> Duration;

    /// Restarts the measurement from zero.
    fn reset(&mut self);
}

/// Wall-clock [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for Stopwatch {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn reset(&mut self) {
        self.started = Instant::now();
    }
}

/// A [`Clock`] that only moves when told to.
///
/// Clones share the same reading, so a test can keep one handle and hand
/// another to the queue.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn reset(&mut self) {
        self.nanos.store(0, Ordering::SeqCst);
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

// ── Jobs ──────────────────────────────────────────────────────────────────────

/// A handle identifying the job that owns a timer.
///
/// Two handles refer to the same job when [`JobHandle::same_job`] says so;
/// adding a timer for a job replaces any timer the same job already owns.
pub trait JobHandle: Clone {
    fn same_job(&self, other: &Self) -> bool;
}

impl<T: ?Sized> JobHandle for Arc<T> {
    fn same_job(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

// ── Queue ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Timer<J> {
    job: J,
    period: f64,
    remaining: f64,
    /// Clock reading when the timer was added; cleared after the first
    /// decrement.
    start: f64,
}

impl<J> Timer<J> {
    fn new(job: J, period: Duration, start: f64) -> Self {
        let period = period.as_secs_f64().max(MIN_PERIOD_SECS);
        Self {
            job,
            period,
            remaining: period,
            start,
        }
    }

    /// Seconds until the timer is due, measured from the last clock reset.
    fn due_in(&self) -> f64 {
        self.remaining + self.start
    }

    fn decrement(&mut self, elapsed: f64) {
        self.remaining -= elapsed - self.start;
        self.start = 0.0;
    }

    fn reset(&mut self) {
        self.remaining = self.period;
        self.start = 0.0;
    }
}

/// Jobs that came due during one [`TimerQueue::process`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerBatch<J> {
    /// Due jobs, soonest first.
    pub jobs: Vec<J>,
    /// Whether the one-shot timer fired (and was consumed).
    pub one_shot_expired: bool,
}

impl<J> Default for TimerBatch<J> {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            one_shot_expired: false,
        }
    }
}

impl<J> TimerBatch<J> {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && !self.one_shot_expired
    }
}

/// Ordered periodic timers plus one optional one-shot countdown.
pub struct TimerQueue<J, C = Stopwatch> {
    /// Sorted by [`Timer::due_in`], soonest first.
    timers: Vec<Timer<J>>,
    one_shot: Option<Timer<()>>,
    clock: C,
}

impl<J: JobHandle> TimerQueue<J, Stopwatch> {
    pub fn new() -> Self {
        Self::with_clock(Stopwatch::new())
    }
}

impl<J: JobHandle> Default for TimerQueue<J, Stopwatch> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J: JobHandle, C: Clock> TimerQueue<J, C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            timers: Vec::new(),
            one_shot: None,
            clock,
        }
    }

    /// Schedules `job` to be collected every `period`, replacing any timer
    /// the job already owns.
    pub fn add(&mut self, job: J, period: Duration) {
        self.remove(&job);
        let start = self.clock.elapsed().as_secs_f64();
        self.insert(Timer::new(job, period, start));
    }

    /// Removes every timer owned by `job`.  Does nothing if there is none.
    pub fn remove(&mut self, job: &J) {
        self.timers.retain(|timer| !timer.job.same_job(job));
    }

    /// Starts the one-shot countdown, replacing any outstanding one.
    pub fn add_one_shot(&mut self, period: Duration) -> u32 {
        let start = self.clock.elapsed().as_secs_f64();
        self.one_shot = Some(Timer::new((), period, start));
        ONE_SHOT_TIMER_ID
    }

    /// Number of periodic timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn has_one_shot(&self) -> bool {
        self.one_shot.is_some()
    }

    /// Time left on the timer owned by `job`, if any.
    pub fn remaining(&self, job: &J) -> Option<Duration> {
        let elapsed = self.clock.elapsed().as_secs_f64();
        self.timers
            .iter()
            .find(|timer| timer.job.same_job(job))
            .map(|timer| secs_to_duration(timer.due_in() - elapsed))
    }

    /// How long the caller may wait before the next timer is due, or `None`
    /// when no timer exists.
    pub fn next_timeout(&self) -> Option<Duration> {
        let soonest = self.timers.first().map(Timer::due_in);
        let one_shot = self.one_shot.as_ref().map(Timer::due_in);
        let due = match (soonest, one_shot) {
            (Some(a), Some(b)) => a.min(b),
            (Some(due), None) | (None, Some(due)) => due,
            (None, None) => return None,
        };
        Some(secs_to_duration(due - self.clock.elapsed().as_secs_f64()))
    }

    /// Advances every countdown by the time elapsed since the last call and
    /// collects the jobs that came due.
    ///
    /// When nothing is due the clock keeps running, so short waits
    /// accumulate until a timer fires.
    pub fn process(&mut self) -> TimerBatch<J> {
        let elapsed = self.clock.elapsed().as_secs_f64();

        let one_shot_due = self
            .one_shot
            .as_ref()
            .is_some_and(|timer| timer.due_in() <= elapsed);
        let periodic_due = self
            .timers
            .first()
            .is_some_and(|timer| timer.due_in() <= elapsed);
        if !one_shot_due && !periodic_due {
            return TimerBatch::default();
        }

        let mut batch = TimerBatch::default();

        let one_shot_expired = match self.one_shot.as_mut() {
            Some(timer) => {
                timer.decrement(elapsed);
                timer.remaining <= 0.0
            }
            None => false,
        };
        if one_shot_expired {
            self.one_shot = None;
            batch.one_shot_expired = true;
        }

        for timer in &mut self.timers {
            timer.decrement(elapsed);
        }

        // A reset timer has a positive countdown again, so each timer is
        // collected at most once.
        while self.timers.first().is_some_and(|timer| timer.remaining <= 0.0) {
            let mut timer = self.timers.remove(0);
            batch.jobs.push(timer.job.clone());
            timer.reset();
            self.insert(timer);
        }

        self.clock.reset();

        trace!(
            jobs = batch.jobs.len(),
            one_shot = batch.one_shot_expired,
            "timers fired"
        );
        batch
    }

    fn insert(&mut self, timer: Timer<J>) {
        let due = timer.due_in();
        let at = self.timers.partition_point(|queued| queued.due_in() <= due);
        self.timers.insert(at, timer);
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    type Job = Arc<&'static str>;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn queue() -> (TimerQueue<Job, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (TimerQueue::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_timer_does_not_fire_before_its_period() {
        // Arrange
        let (mut timers, clock) = queue();
        let job: Job = Arc::new("poll");
        timers.add(job, ms(1000));

        // Act
        clock.advance(ms(999));
        let batch = timers.process();

        // Assert
        assert!(batch.is_empty());
    }

    #[test]
    fn test_timer_fires_once_and_resets_to_full_period() {
        // Arrange
        let (mut timers, clock) = queue();
        let job: Job = Arc::new("poll");
        timers.add(job.clone(), ms(1000));

        // Act
        clock.advance(ms(1300));
        let batch = timers.process();

        // Assert
        assert_eq!(batch.jobs.len(), 1);
        assert!(batch.jobs[0].same_job(&job));
        assert_eq!(timers.remaining(&job), Some(ms(1000)));
    }

    #[test]
    fn test_late_process_fires_at_most_once() {
        // Arrange
        let (mut timers, clock) = queue();
        let job: Job = Arc::new("poll");
        timers.add(job.clone(), ms(100));

        // Act: 2.5 periods late.
        clock.advance(ms(250));
        let first = timers.process();
        let second = timers.process();

        // Assert
        assert_eq!(first.jobs.len(), 1);
        assert!(second.is_empty());
        assert_eq!(timers.len(), 1);

        clock.advance(ms(100));
        assert_eq!(timers.process().jobs.len(), 1);
    }

    #[test]
    fn test_adding_same_job_twice_replaces_timer() {
        let (mut timers, _clock) = queue();
        let job: Job = Arc::new("poll");

        timers.add(job.clone(), ms(100));
        timers.add(job.clone(), ms(500));

        assert_eq!(timers.len(), 1);
        assert_eq!(timers.remaining(&job), Some(ms(500)));
    }

    #[test]
    fn test_removing_absent_job_is_a_no_op() {
        let (mut timers, _clock) = queue();
        let kept: Job = Arc::new("kept");
        timers.add(kept.clone(), ms(100));

        timers.remove(&Arc::new("absent"));

        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_jobs_with_equal_values_are_distinct_owners() {
        let (mut timers, _clock) = queue();
        timers.add(Arc::new("same"), ms(100));
        timers.add(Arc::new("same"), ms(100));
        assert_eq!(timers.len(), 2);
    }

    #[test]
    fn test_due_jobs_are_collected_soonest_first() {
        // Arrange
        let (mut timers, clock) = queue();
        let slow: Job = Arc::new("slow");
        let fast: Job = Arc::new("fast");
        timers.add(slow.clone(), ms(1000));
        timers.add(fast.clone(), ms(500));

        // Act
        clock.advance(ms(1200));
        let batch = timers.process();

        // Assert
        assert_eq!(batch.jobs.len(), 2);
        assert!(batch.jobs[0].same_job(&fast));
        assert!(batch.jobs[1].same_job(&slow));
    }

    #[test]
    fn test_first_decrement_only_counts_time_since_add() {
        // Arrange: the clock already ran 400ms before the timer existed.
        let (mut timers, clock) = queue();
        clock.advance(ms(400));
        let job: Job = Arc::new("late");
        timers.add(job, ms(1000));

        // Act / Assert
        clock.advance(ms(700));
        assert!(timers.process().is_empty());

        clock.advance(ms(350));
        assert_eq!(timers.process().jobs.len(), 1);
    }

    #[test]
    fn test_second_one_shot_replaces_first() {
        // Arrange
        let (mut timers, clock) = queue();
        assert_eq!(timers.add_one_shot(ms(100)), ONE_SHOT_TIMER_ID);
        assert_eq!(timers.add_one_shot(ms(500)), ONE_SHOT_TIMER_ID);

        // Act / Assert: the first deadline passes silently.
        clock.advance(ms(200));
        assert!(!timers.process().one_shot_expired);

        clock.advance(ms(400));
        let batch = timers.process();
        assert!(batch.one_shot_expired);
        assert!(!timers.has_one_shot());

        clock.advance(ms(1000));
        assert!(timers.process().is_empty());
    }

    #[test]
    fn test_one_shot_never_enters_periodic_queue() {
        let (mut timers, _clock) = queue();
        timers.add_one_shot(ms(10));
        assert!(timers.is_empty());
        assert!(timers.has_one_shot());
    }

    #[test]
    fn test_next_timeout_is_soonest_deadline_minus_elapsed() {
        // Arrange
        let (mut timers, clock) = queue();
        assert_eq!(timers.next_timeout(), None);

        timers.add(Arc::new("periodic"), ms(2000));
        timers.add_one_shot(ms(1000));

        // Act
        clock.advance(ms(250));

        // Assert
        assert_eq!(timers.next_timeout(), Some(ms(750)));
    }

    #[test]
    fn test_next_timeout_saturates_at_zero_when_overdue() {
        let (mut timers, clock) = queue();
        timers.add(Arc::new("periodic"), ms(100));
        clock.advance(ms(300));
        assert_eq!(timers.next_timeout(), Some(Duration::ZERO));
    }

    #[test]
    fn test_zero_period_is_clamped_and_terminates() {
        let (mut timers, clock) = queue();
        timers.add(Arc::new("busy"), Duration::ZERO);
        clock.advance(ms(1));
        assert_eq!(timers.process().jobs.len(), 1);
    }
}
