//! Watchers
//!
//! [`watch`] runs a callback with the new and previous value whenever a
//! source changes. It is an effect whose scheduler, instead of re-running
//! blindly, re-reads the source and compares.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::cell::Ref;
use super::computed::Computed;
use super::effect::{EffectScheduler, ReactiveEffect};
use super::trackable::Trackable;
use crate::store::{Reactive, Value};

/// What a watcher observes.
pub struct WatchSource<T> {
    getter: Box<dyn Fn() -> T>,
    deep: bool,
}

impl<T: Trackable> WatchSource<T> {
    /// Watch whatever `getter` reads.
    pub fn getter(getter: impl Fn() -> T + 'static) -> Self {
        Self {
            getter: Box::new(getter),
            deep: false,
        }
    }
}

impl<T: Trackable> From<Ref<T>> for WatchSource<T> {
    fn from(cell: Ref<T>) -> Self {
        Self::getter(move || cell.get())
    }
}

impl<T: Trackable> From<Computed<T>> for WatchSource<T> {
    fn from(computed: Computed<T>) -> Self {
        Self::getter(move || computed.get())
    }
}

/// Watching a proxy watches every key beneath it.
impl From<Reactive> for WatchSource<Value> {
    fn from(proxy: Reactive) -> Self {
        Self {
            getter: Box::new(move || Value::Reactive(proxy.clone())),
            deep: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Call back once right away, with no previous value.
    pub immediate: bool,
    /// Stop after the first call.
    pub once: bool,
    /// Track every nested value of the source, and call back on any nested
    /// change even if the source itself is the same object.
    pub deep: bool,
}

/// Handle returned by [`watch`].
pub struct WatchHandle<T> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> WatchHandle<T> {
    /// Stop watching. The callback will not be called again.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

impl<T> WatchHandle<T> {
    pub fn is_stopped(&self) -> bool {
        self.effect.is_stopped()
    }
}

impl<T> Clone for WatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T> fmt::Debug for WatchHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("effect", &self.effect).finish()
    }
}

/// Call `callback(new, previous)` whenever `source` changes.
///
/// The watcher keeps running after the handle is dropped, until
/// [`WatchHandle::stop`] is called or the source is gone.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::{watch, Ref, WatchOptions};
///
/// let count = Ref::new(1);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let handle = watch(
///     count.clone(),
///     {
///         let seen = seen.clone();
///         move |new: &i32, old: Option<&i32>| seen.borrow_mut().push((*new, old.copied()))
///     },
///     WatchOptions::default(),
/// );
///
/// count.set(2);
/// handle.stop();
/// count.set(3);
/// assert_eq!(*seen.borrow(), vec![(2, Some(1))]);
/// ```
pub fn watch<T, S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle<T>
where
    T: Trackable,
    S: Into<WatchSource<T>>,
    F: Fn(&T, Option<&T>) + 'static,
{
    let WatchSource { getter, deep } = source.into();
    let deep = deep || options.deep;

    let effect = ReactiveEffect::new(move || {
        let value = getter();
        if deep {
            value.traverse();
        }
        value
    });

    // Value seen by the last run, handed to the callback as the old one.
    let previous: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));

    let job: EffectScheduler<T> = Rc::new({
        let previous = previous.clone();
        move |effect: &ReactiveEffect<T>| {
            let value = effect.run();
            let old = previous.borrow_mut().replace(value.clone());

            let changed = old.as_ref().map_or(true, |old| !old.same_value(&value));
            if deep || changed {
                if options.once {
                    effect.stop();
                }
                debug!(deep, changed, "watch callback");
                callback(&value, old.as_ref());
            }
        }
    });

    effect.set_scheduler(Some(Rc::clone(&job)));

    if options.immediate {
        job(&effect);
    } else {
        let initial = effect.run();
        *previous.borrow_mut() = Some(initial);
    }

    WatchHandle { effect }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::computed;
    use crate::store::reactive;
    use serde_json::json;

    type Calls<T> = Rc<RefCell<Vec<(T, Option<T>)>>>;

    fn recorder<T: Trackable>() -> (Calls<T>, impl Fn(&T, Option<&T>) + 'static) {
        let calls: Calls<T> = Rc::new(RefCell::new(Vec::new()));
        let record = {
            let calls = calls.clone();
            move |new: &T, old: Option<&T>| calls.borrow_mut().push((new.clone(), old.cloned()))
        };
        (calls, record)
    }

    #[test]
    fn watch_ref_reports_new_and_old() {
        let count = Ref::new(1);
        let (calls, record) = recorder::<i32>();

        let _handle = watch(count.clone(), record, WatchOptions::default());
        assert!(calls.borrow().is_empty());

        count.set(2);
        count.set(2);
        count.set(5);
        assert_eq!(*calls.borrow(), vec![(2, Some(1)), (5, Some(2))]);
    }

    #[test]
    fn immediate_fires_without_an_old_value() {
        let name = Ref::new(String::from("a"));
        let (calls, record) = recorder::<String>();

        let _handle = watch(
            name.clone(),
            record,
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
        );
        name.set(String::from("b"));

        assert_eq!(
            *calls.borrow(),
            vec![
                (String::from("a"), None),
                (String::from("b"), Some(String::from("a")))
            ]
        );
    }

    #[test]
    fn once_stops_after_the_first_call() {
        let count = Ref::new(0);
        let (calls, record) = recorder::<i32>();

        let handle = watch(
            count.clone(),
            record,
            WatchOptions {
                once: true,
                ..WatchOptions::default()
            },
        );

        count.set(1);
        count.set(2);
        assert_eq!(*calls.borrow(), vec![(1, Some(0))]);
        assert!(handle.is_stopped());
    }

    #[test]
    fn getter_source_only_fires_when_the_result_changes() {
        let count = Ref::new(1);
        let (calls, record) = recorder::<bool>();

        let _handle = watch(
            WatchSource::getter({
                let count = count.clone();
                move || count.get() > 2
            }),
            record,
            WatchOptions::default(),
        );

        count.set(2);
        count.set(3);
        count.set(4);
        assert_eq!(*calls.borrow(), vec![(true, Some(false))]);
    }

    #[test]
    fn watch_computed() {
        let count = Ref::new(2);
        let doubled = computed({
            let count = count.clone();
            move || count.get() * 2
        });
        let (calls, record) = recorder::<i32>();

        let _handle = watch(doubled, record, WatchOptions::default());
        count.set(3);
        assert_eq!(*calls.borrow(), vec![(6, Some(4))]);
    }

    #[test]
    fn stop_ends_the_watch() {
        let count = Ref::new(0);
        let (calls, record) = recorder::<i32>();

        let handle = watch(count.clone(), record, WatchOptions::default());
        handle.stop();
        count.set(1);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn deep_watch_sees_nested_writes_on_the_same_object() {
        let state = reactive(Value::from(json!({ "a": { "b": { "c": 1 } } })));
        let proxy = state.to_reactive().unwrap();
        let (calls, record) = recorder::<Value>();

        let _handle = watch(proxy.clone(), record, WatchOptions::default());

        let c_holder = proxy.get("a").to_reactive().unwrap().get("b").to_reactive().unwrap();
        c_holder.set("c", 2).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        let (new, old) = &calls[0];
        assert_eq!(Some(new), old.as_ref());
        assert_eq!(new.to_json().unwrap(), json!({ "a": { "b": { "c": 2 } } }));
    }

    #[test]
    fn shallow_watch_of_a_ref_ignores_nested_writes() {
        let state = Ref::new(Value::from(json!({ "a": 1 })));
        let (calls, record) = recorder::<Value>();

        let _handle = watch(state.clone(), record, WatchOptions::default());
        state.get().to_reactive().unwrap().set("a", 2).unwrap();
        assert!(calls.borrow().is_empty());

        let _deep = watch(
            state.clone(),
            |_: &Value, _: Option<&Value>| {},
            WatchOptions {
                deep: true,
                ..WatchOptions::default()
            },
        );
        state.set(Value::from(json!({ "a": 3 })));
        assert_eq!(calls.borrow().len(), 1);
    }
}
