mod new_ticket;
mod notifications;
mod ticket_detail;
mod ticket_list;

pub use new_ticket::NewTicketView;
pub use notifications::NotificationsView;
pub use ticket_detail::TicketDetailView;
pub use ticket_list::{TicketListView, TicketScope};
