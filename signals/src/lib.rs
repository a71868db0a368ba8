/*!
Observable state for tether hosts.

A UI host never owns the state that tether components mutate. Instead it
holds a [`Read`] handle and listens for changes, which keeps the writer
(an autosave scheduler, an optimistic controller) and the reader as distinct
types:

- writers hold a [`Mut`] and are the only ones able to change the value
- readers hold a [`Read`] and can peek at the present value, subscribe to
  changes, or asynchronously wait for a predicate to hold
- listeners are removed when their guard is dropped, so a torn-down host
  stops receiving notifications without any explicit unsubscribe

# Basic usage

```rust
use tether_signals::*;

let saving = Mut::new(false);
let reader = saving.read();
let _guard = reader.subscribe(|value: bool| println!("saving: {value}"));

saving.set(true);
// saving: true
saving.set(true); // unchanged values are still broadcast by `set`
// saving: true
saving.set_if_changed(true); // ...but not by `set_if_changed`
assert!(reader.value());
```
*/

pub mod broadcast;
pub mod signal;
pub mod subscribe;
pub mod value;
#[cfg(feature = "tokio")]
pub mod wait;

pub use broadcast::{Broadcast, BroadcastId, ListenerGuard};
pub use signal::*;
pub use subscribe::*;
#[cfg(feature = "tokio")]
pub use wait::*;
