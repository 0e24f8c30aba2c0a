//! 域封装 (Domain wrappers)
//!
//! Typed wrappers over a handful of CDP domains. Each wrapper is built at most
//! once per client through the domain registry and keeps its standing event
//! views for its whole life.

pub mod network;
pub mod page;
pub mod runtime;
pub mod target;

pub use network::Network;
pub use page::Page;
pub use runtime::Runtime;
pub use target::Target;

use crate::cdp::client::SessionHandle;
use crate::cdp::hub::EventView;
use crate::cdp::types::Event;
use std::sync::OnceLock;

/// Standing view stored in `slot`, created from `session` on first use
pub(crate) fn standing_view<'a, E: Event>(
    slot: &'a OnceLock<EventView<E>>,
    session: &SessionHandle,
) -> &'a EventView<E> {
    slot.get_or_init(|| {
        let capacity = session.session().events().capacity();
        EventView::new(session.events::<E>(), capacity)
    })
}
