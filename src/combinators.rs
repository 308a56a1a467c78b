//! Derived signals and events.
//!
//! Every combinator builds its output eagerly: the derived node is created with
//! its initial value and then registered as an observer on each input. From
//! then on the inputs push changes into it during propagation.
//!
//! Multi-input derivations read the *current* value of the other inputs when
//! one input fires. In a diamond (two inputs sharing an ancestor) the output is
//! therefore updated once per leg, and a sink can observe a transient value
//! combining one fresh and one stale input. Once the triggering update returns
//! the output is consistent with its inputs again.
//!
//! Combinators read their inputs once at construction and panic if an input
//! has already been disposed.
//!
//! A panic inside a combinator's function unwinds out of the `update` or
//! `trigger` that caused it. Inputs keep the value they were given; the
//! derived node keeps its previous value.

use crate::event::{make_derived_event, Event};
use crate::signal::{make_derived, Signal};
use crate::storage::{self, erase, Callback, NodeId};
use std::rc::Rc;

/// Register `callback` on `input` as the driver of `output`.
fn feed(input: NodeId, output: NodeId, callback: Callback) {
    if let Err(err) = storage::observe(input, Some(output), callback) {
        tracing::debug!(%err, node = ?output, "input disposed; derived node will not update");
    }
}

/// Derive a signal by applying `f` to every value of `input`.
pub fn lift<A, B, F>(input: Signal<A>, f: F) -> Signal<B>
where
    A: Clone + 'static,
    B: Clone + PartialEq + 'static,
    F: Fn(&A) -> B + 'static,
{
    let initial = f(&input.get());
    let (output, updater) = make_derived(initial);
    feed(
        input.id(),
        output.id(),
        erase(move |value: &A| {
            updater.update(f(value));
        }),
    );
    output
}

/// Derive a signal from two inputs.
///
/// When one input changes, `f` sees its new value together with whatever the
/// other input holds at that moment.
pub fn lift2<A, B, C, F>(x: Signal<A>, y: Signal<B>, f: F) -> Signal<C>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + PartialEq + 'static,
    F: Fn(&A, &B) -> C + 'static,
{
    let initial = f(&x.get(), &y.get());
    let (output, updater) = make_derived(initial);
    let f = Rc::new(f);

    let on_x = {
        let f = f.clone();
        move |a: &A| {
            if let Ok(b) = y.try_get() {
                updater.update(f(a, &b));
            }
        }
    };
    let on_y = move |b: &B| {
        if let Ok(a) = x.try_get() {
            updater.update(f(&a, b));
        }
    };

    feed(x.id(), output.id(), erase(on_x));
    feed(y.id(), output.id(), erase(on_y));
    output
}

/// Derive a signal from three inputs. See [`lift2`].
pub fn lift3<A, B, C, D, F>(x: Signal<A>, y: Signal<B>, z: Signal<C>, f: F) -> Signal<D>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    D: Clone + PartialEq + 'static,
    F: Fn(&A, &B, &C) -> D + 'static,
{
    let initial = f(&x.get(), &y.get(), &z.get());
    let (output, updater) = make_derived(initial);
    let f = Rc::new(f);

    let on_x = {
        let f = f.clone();
        move |a: &A| {
            if let (Ok(b), Ok(c)) = (y.try_get(), z.try_get()) {
                updater.update(f(a, &b, &c));
            }
        }
    };
    let on_y = {
        let f = f.clone();
        move |b: &B| {
            if let (Ok(a), Ok(c)) = (x.try_get(), z.try_get()) {
                updater.update(f(&a, b, &c));
            }
        }
    };
    let on_z = move |c: &C| {
        if let (Ok(a), Ok(b)) = (x.try_get(), y.try_get()) {
            updater.update(f(&a, &b, c));
        }
    };

    feed(x.id(), output.id(), erase(on_x));
    feed(y.id(), output.id(), erase(on_y));
    feed(z.id(), output.id(), erase(on_z));
    output
}

/// A signal holding the most recent payload of `event`, starting at `initial`.
///
/// Payloads equal to the held value do not notify the signal's observers.
pub fn hold<T: Clone + PartialEq + 'static>(event: Event<T>, initial: T) -> Signal<T> {
    let (output, updater) = make_derived(initial);
    feed(
        event.id(),
        output.id(),
        erase(move |payload: &T| {
            updater.update(payload.clone());
        }),
    );
    output
}

/// Derive an event by applying `f` to every payload of `event`.
pub fn lift_ev<A, B, F>(event: Event<A>, f: F) -> Event<B>
where
    A: 'static,
    B: 'static,
    F: Fn(&A) -> B + 'static,
{
    let (output, trigger) = make_derived_event();
    feed(
        event.id(),
        output.id(),
        erase(move |payload: &A| trigger.trigger(f(payload))),
    );
    output
}

impl<T: Clone + 'static> Signal<T> {
    /// Derive a signal from this one. Alias for [`lift`].
    pub fn map<U, F>(&self, f: F) -> Signal<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        lift(*self, f)
    }
}

impl<T: 'static> Event<T> {
    /// Derive an event from this one. Alias for [`lift_ev`].
    pub fn map<U, F>(&self, f: F) -> Event<U>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static,
    {
        lift_ev(*self, f)
    }

    /// Hold the latest payload in a signal. Alias for [`hold`].
    pub fn hold(&self, initial: T) -> Signal<T>
    where
        T: Clone + PartialEq,
    {
        hold(*self, initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::stats;
    use crate::{iter, iter_ev, make, make_event};
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;

    fn record<T: Clone + PartialEq + 'static>(signal: Signal<T>) -> Arc<Mutex<Vec<T>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        iter(signal, move |value: &T| seen_clone.lock().push(value.clone()));
        seen
    }

    #[test]
    fn test_lift_tracks_input() {
        let (count, set_count) = make(5);
        let doubled = lift(count, |n| n * 2);
        assert_eq!(doubled.get(), 10);

        set_count.update(7);
        assert_eq!(doubled.get(), 14);
    }

    #[test]
    fn test_lift_dedups_its_own_output() {
        let (count, set_count) = make(1);
        let parity = count.map(|n| n % 2 == 0);
        let seen = record(parity);

        set_count.update(3);
        set_count.update(5);
        set_count.update(6);
        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[test]
    fn test_lift_chain() {
        let (base, set_base) = make(5);
        let doubled = base.map(|n| n * 2);
        let plus_ten = doubled.map(|n| n + 10);
        assert_eq!(plus_ten.get(), 20);

        set_base.update(10);
        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn test_lift2_consistent_after_settling() {
        let (first, set_first) = make(String::from("Ada"));
        let (last, set_last) = make(String::from("Lovelace"));
        let full = lift2(first, last, |f, l| format!("{f} {l}"));
        assert_eq!(full.get(), "Ada Lovelace");

        set_last.update(String::from("Byron"));
        assert_eq!(full.get(), "Ada Byron");
        set_first.update(String::from("Augusta"));
        assert_eq!(full.get(), "Augusta Byron");
    }

    #[test]
    fn test_diamond_delivers_transient_glitch() {
        let (a, set_a) = make(0);
        let x = lift(a, |v| v + 1);
        let y = lift(a, |v| v * 2);
        let z = lift2(x, y, |p, q| p + q);
        let seen = record(z);
        assert_eq!(*seen.lock(), vec![1]);

        set_a.update(1);
        assert_eq!(*seen.lock(), vec![1, 2, 4]);
        assert_eq!(z.get(), 4);
    }

    #[test]
    fn test_lift3() {
        let (x, set_x) = make(1);
        let (y, set_y) = make(10);
        let (z, set_z) = make(100);
        let sum = lift3(x, y, z, |a, b, c| a + b + c);
        let seen = record(sum);

        set_x.update(2);
        set_y.update(20);
        set_z.update(200);
        assert_eq!(*seen.lock(), vec![111, 112, 122, 222]);
    }

    #[test]
    fn test_lift2_randomized_consistency() {
        let mut rng = StdRng::seed_from_u64(7);
        let (a, set_a) = make(0i64);
        let (b, set_b) = make(0i64);
        let left = a.map(|v| v * 3);
        let right = lift2(a, b, |p, q| p - q);
        let combined = lift2(left, right, |l, r| l * 2 + r);

        for _ in 0..500 {
            if rng.gen_bool(0.5) {
                set_a.update(rng.gen_range(-20..20));
            } else {
                set_b.update(rng.gen_range(-20..20));
            }
            let (av, bv) = (a.get(), b.get());
            assert_eq!(right.get(), av - bv);
            assert_eq!(combined.get(), av * 3 * 2 + (av - bv));
        }
    }

    #[test]
    fn test_hold() {
        let (event, trigger) = make_event();
        let held = hold(event, 10);
        assert_eq!(held.get(), 10);

        trigger.trigger(99);
        assert_eq!(held.get(), 99);
    }

    #[test]
    fn test_hold_dedups_repeated_payloads() {
        let (event, trigger) = make_event();
        let held = event.hold(0);
        let seen = record(held);

        trigger.trigger(3);
        trigger.trigger(3);
        trigger.trigger(4);
        assert_eq!(*seen.lock(), vec![0, 3, 4]);
    }

    #[test]
    fn test_lift_ev() {
        let (clicks, click) = make_event::<u32>();
        let labels = lift_ev(clicks, |n| format!("clicked {n}"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        iter_ev(labels, move |label: &String| seen_clone.lock().push(label.clone()));

        click.trigger(1);
        click.trigger(1);
        assert_eq!(*seen.lock(), vec!["clicked 1", "clicked 1"]);
    }

    #[test]
    fn test_event_map_then_hold() {
        let (keys, press) = make_event::<char>();
        let upper = keys.map(|c| c.to_ascii_uppercase()).hold(' ');
        press.trigger('q');
        assert_eq!(upper.get(), 'Q');
    }

    #[test]
    fn test_dispose_derived_detaches_from_input() {
        let before = stats();
        let (a, set_a) = make(1);
        let doubled = a.map(|n| n * 2);
        let quadrupled = doubled.map(|n| n * 2);

        assert!(doubled.dispose());
        assert!(quadrupled.is_disposed());
        assert!(!a.is_disposed());

        set_a.update(5);
        assert_eq!(quadrupled.try_get().ok(), None);
        assert_eq!(stats().nodes, before.nodes + 1);
        assert_eq!(stats().observers, before.observers);
    }

    #[test]
    fn test_dispose_one_input_cascades_to_lift2() {
        let (x, set_x) = make(1);
        let (y, set_y) = make(2);
        let sum = lift2(x, y, |a, b| a + b);

        assert!(!x.dispose());
        assert!(set_x.dispose());
        assert!(sum.is_disposed());
        assert!(set_y.update(5));
        assert_eq!(y.get(), 5);
        assert_eq!(sum.try_get().ok(), None);
    }

    #[test]
    fn test_panic_in_lift_unwinds_to_update() {
        let (ratio, set_ratio) = make(2);
        let inverse = ratio.map(|n| {
            if *n == 0 {
                panic!("division by zero");
            }
            100 / n
        });
        let seen = record(inverse);

        let result = catch_unwind(AssertUnwindSafe(|| set_ratio.update(0)));
        assert!(result.is_err());
        assert_eq!(ratio.get(), 0);
        assert_eq!(inverse.get(), 50);

        assert!(set_ratio.update(4));
        assert_eq!(*seen.lock(), vec![50, 25]);
    }

    #[test]
    fn test_lift_ev_output_is_disposable() {
        let (clicks, click) = make_event::<u32>();
        let doubled = clicks.map(|n| n * 2);
        let held = doubled.hold(0);

        assert!(doubled.dispose());
        assert!(held.is_disposed());
        assert!(!clicks.is_disposed());
        assert!(click.try_trigger(1).is_ok());
    }
}
