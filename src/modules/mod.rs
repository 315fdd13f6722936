pub mod events;
pub mod filters;
pub mod ideas;
pub mod orders;
pub mod past_events;
pub mod press;
pub mod products;
pub mod stories;
pub mod subscriptions;
pub mod talk_section;
