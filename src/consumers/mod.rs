//! Page-level consumers of the event hub.

pub mod leave_list;

pub use leave_list::{LeaveListState, LeaveListView};
