// SPDX-License-Identifier: MIT OR Apache-2.0
//! Push-based multicast streams.
//!
//! [`Subject`] is the single-threaded publisher every port is built on. It
//! keeps an explicit subscriber list and an optional last-value cache.
//!
//! Delivery works on a snapshot of the subscriber list, and no `RefCell`
//! borrow is held while a callback runs. A callback may therefore subscribe,
//! unsubscribe or emit again. A subscriber deactivated mid-emission is skipped,
//! and every other subscriber in the snapshot is served exactly once.

use crate::error::PropagationError;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T) -> Result<(), PropagationError>;

struct Subscriber<T> {
    active: Cell<bool>,
    callback: Box<Callback<T>>,
}

struct SubjectState<T> {
    subscribers: Vec<Rc<Subscriber<T>>>,
    last: Option<T>,
    replay: bool,
    completed: bool,
}

/// Multicast publisher with optional replay of the last value
pub struct Subject<T> {
    state: Rc<RefCell<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + 'static> Subject<T> {
    fn with_state(replay: bool, last: Option<T>) -> Self {
        Self {
            state: Rc::new(RefCell::new(SubjectState {
                subscribers: Vec::new(),
                last,
                replay,
                completed: false,
            })),
        }
    }

    /// Plain multicast subject, nothing is replayed
    pub fn new() -> Self {
        Self::with_state(false, None)
    }

    /// Subject replaying its last value to new subscribers
    pub fn replaying() -> Self {
        Self::with_state(true, None)
    }

    /// Replaying subject that starts with a value
    pub fn with_value(value: T) -> Self {
        Self::with_state(true, Some(value))
    }

    /// Last emitted value (always `None` for non-replaying subjects)
    pub fn value(&self) -> Option<T> {
        self.state.borrow().last.clone()
    }

    /// Whether [`Subject::complete`] was called
    pub fn is_completed(&self) -> bool {
        self.state.borrow().completed
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    /// Emit a value to every active subscriber.
    ///
    /// Returns the faults raised by subscribers once all of them were served.
    /// Emitting on a completed subject does nothing.
    pub fn next(&self, value: T) -> Result<(), PropagationError> {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                return Ok(());
            }
            if state.replay {
                state.last = Some(value.clone());
            }
            state.subscribers.clone()
        };

        let mut faults = PropagationError::default();
        for subscriber in subscribers {
            if subscriber.active.get() {
                faults.absorb((subscriber.callback)(&value));
            }
        }
        faults.into_result()
    }

    /// Register a callback.
    ///
    /// A replaying subject with a cached value delivers it before returning.
    /// If that replay faults, the subscription is cancelled and the fault is
    /// returned.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, PropagationError>
    where
        F: Fn(&T) -> Result<(), PropagationError> + 'static,
    {
        let (subscription, replayed) = self.subscribe_replayed(callback);
        replayed.map(|()| subscription)
    }

    /// Register a callback, keeping it registered whatever the replay
    /// reports.
    ///
    /// The second element carries the faults raised while delivering the
    /// cached value, if any.
    pub fn subscribe_replayed<F>(&self, callback: F) -> (Subscription, Result<(), PropagationError>)
    where
        F: Fn(&T) -> Result<(), PropagationError> + 'static,
    {
        let subscriber = Rc::new(Subscriber {
            active: Cell::new(true),
            callback: Box::new(callback),
        });
        let replay = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                return (Subscription::empty(), Ok(()));
            }
            state.subscribers.push(Rc::clone(&subscriber));
            state.last.clone()
        };

        let subscription = Subscription::new(Rc::downgrade(&self.state), Rc::clone(&subscriber));
        let replayed = match replay {
            Some(value) if subscriber.active.get() => (subscriber.callback)(&value),
            _ => Ok(()),
        };
        (subscription, replayed)
    }

    /// Deactivate every subscriber and refuse further values
    pub fn complete(&self) {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            state.completed = true;
            std::mem::take(&mut state.subscribers)
        };
        for subscriber in subscribers {
            subscriber.active.set(false);
        }
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

trait Unsubscribe {
    fn unsubscribe(&self);
}

struct Registration<T> {
    state: Weak<RefCell<SubjectState<T>>>,
    subscriber: Rc<Subscriber<T>>,
}

impl<T: 'static> Unsubscribe for Registration<T> {
    fn unsubscribe(&self) {
        self.subscriber.active.set(false);
        if let Some(state) = self.state.upgrade() {
            state
                .borrow_mut()
                .subscribers
                .retain(|s| !Rc::ptr_eq(s, &self.subscriber));
        }
    }
}

/// Handle to a registered callback; unsubscribes when dropped
#[must_use = "dropping a subscription unsubscribes it"]
pub struct Subscription {
    registration: Option<Box<dyn Unsubscribe>>,
}

impl Subscription {
    fn new<T: 'static>(state: Weak<RefCell<SubjectState<T>>>, subscriber: Rc<Subscriber<T>>) -> Self {
        Self {
            registration: Some(Box::new(Registration { state, subscriber })),
        }
    }

    /// A subscription that is not attached to anything
    pub fn empty() -> Self {
        Self { registration: None }
    }

    /// Whether the callback still receives values
    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }

    /// Stop receiving values; idempotent
    pub fn unsubscribe(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Combine the latest value of every source into `target`.
///
/// Nothing is emitted until each source has produced at least one value.
/// After that, every change of any source emits `combine` over the latest
/// values. With no sources, `combine(&[])` is emitted once.
pub fn combine_latest<T, U, F>(
    sources: &[Subject<T>],
    target: &Subject<U>,
    combine: F,
) -> Result<Vec<Subscription>, PropagationError>
where
    T: Clone + 'static,
    U: Clone + 'static,
    F: Fn(&[T]) -> U + 'static,
{
    if sources.is_empty() {
        target.next(combine(&[]))?;
        return Ok(Vec::new());
    }

    let latest: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; sources.len()]));
    let combine = Rc::new(combine);
    let mut subscriptions = Vec::with_capacity(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let latest = Rc::clone(&latest);
        let combine = Rc::clone(&combine);
        let target = target.clone();
        let subscription = source.subscribe(move |value: &T| {
            let complete: Option<Vec<T>> = {
                let mut latest = latest.borrow_mut();
                latest[index] = Some(value.clone());
                latest.iter().cloned().collect()
            };
            match complete {
                Some(values) => target.next(combine(&values)),
                None => Ok(()),
            }
        })?;
        subscriptions.push(subscription);
    }
    Ok(subscriptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T) -> Result<(), PropagationError>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |v: &T| {
            sink.borrow_mut().push(v.clone());
            Ok(())
        })
    }

    #[test]
    fn test_multicast_in_subscription_order() {
        let subject = Subject::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (Rc::clone(&order), Rc::clone(&order));
        let _a = subject
            .subscribe(move |v: &i32| {
                o1.borrow_mut().push(("a", *v));
                Ok(())
            })
            .unwrap();
        let _b = subject
            .subscribe(move |v: &i32| {
                o2.borrow_mut().push(("b", *v));
                Ok(())
            })
            .unwrap();

        subject.next(1).unwrap();
        assert_eq!(*order.borrow(), vec![("a", 1), ("b", 1)]);
    }

    #[test]
    fn test_replay_to_late_subscriber() {
        let plain = Subject::new();
        plain.next(1).unwrap();
        let (seen, sink) = recorder::<i32>();
        let _s = plain.subscribe(sink).unwrap();
        assert!(seen.borrow().is_empty());

        let replaying = Subject::replaying();
        replaying.next(5).unwrap();
        let (seen, sink) = recorder::<i32>();
        let _s = replaying.subscribe(sink).unwrap();
        assert_eq!(*seen.borrow(), vec![5]);
        assert_eq!(replaying.value(), Some(5));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subject = Subject::new();
        let (seen, sink) = recorder::<i32>();
        let subscription = subject.subscribe(sink).unwrap();
        assert_eq!(subject.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(subject.subscriber_count(), 0);
        subject.next(1).unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_unsubscribe_during_emission_skips_only_that_subscriber() {
        let subject: Subject<i32> = Subject::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let killer_victim = Rc::clone(&victim);
        let _killer = subject
            .subscribe(move |_| {
                if let Some(mut s) = killer_victim.borrow_mut().take() {
                    s.unsubscribe();
                }
                Ok(())
            })
            .unwrap();
        let (victim_seen, sink) = recorder::<i32>();
        *victim.borrow_mut() = Some(subject.subscribe(sink).unwrap());
        let (tail_seen, sink) = recorder::<i32>();
        let _tail = subject.subscribe(sink).unwrap();

        subject.next(7).unwrap();
        assert!(victim_seen.borrow().is_empty());
        assert_eq!(*tail_seen.borrow(), vec![7]);
    }

    #[test]
    fn test_replay_fault_cancels_only_plain_subscribe() {
        let subject = Subject::with_value(1);
        let failing = |_: &i32| Err(PropagationError::default());

        assert!(subject.subscribe(failing).is_err());
        assert_eq!(subject.subscriber_count(), 0);

        let (subscription, replayed) = subject.subscribe_replayed(failing);
        assert!(replayed.is_err());
        assert!(subscription.is_active());
        assert_eq!(subject.subscriber_count(), 1);
    }

    #[test]
    fn test_complete_stops_delivery() {
        let subject = Subject::replaying();
        let (seen, sink) = recorder::<i32>();
        let subscription = subject.subscribe(sink).unwrap();
        subject.complete();
        subject.next(1).unwrap();
        assert!(seen.borrow().is_empty());
        assert!(subject.is_completed());
        assert_eq!(subject.subscriber_count(), 0);
        drop(subscription);
    }

    #[test]
    fn test_combine_latest_waits_for_every_source() {
        let a = Subject::new();
        let b = Subject::new();
        let sum = Subject::replaying();
        let _subs = combine_latest(&[a.clone(), b.clone()], &sum, |v: &[i32]| v.iter().sum::<i32>()).unwrap();

        a.next(3).unwrap();
        assert_eq!(sum.value(), None);
        b.next(4).unwrap();
        assert_eq!(sum.value(), Some(7));
        a.next(10).unwrap();
        assert_eq!(sum.value(), Some(14));
    }

    #[test]
    fn test_combine_latest_without_sources_emits_once() {
        let target = Subject::replaying();
        let subs = combine_latest(&[] as &[Subject<i32>], &target, |_| 42).unwrap();
        assert!(subs.is_empty());
        assert_eq!(target.value(), Some(42));
    }
}
