use std::sync::Arc;

use kerbside_core::{coordinator::CollectionCoordinator, model::Address};
use kerbside_provider_southglos::SouthGlosProvider;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Screen {
    PostcodeEntry,
    AddressSelect,
    Dashboard,
}

pub(crate) struct App {
    pub provider: Arc<SouthGlosProvider>,

    pub screen: Screen,
    pub postcode_input: String,
    pub address_results: Vec<Address>,
    pub address_list_index: usize,
    pub selected_address: Option<Address>,

    /// Present while the dashboard is open; polls in the background.
    pub coordinator: Option<CollectionCoordinator>,

    pub is_loading: bool,
    pub error_message: Option<String>,
}

impl App {
    pub(crate) fn new(provider: Arc<SouthGlosProvider>) -> Self {
        Self {
            provider,
            screen: Screen::PostcodeEntry,
            postcode_input: String::new(),
            address_results: Vec::new(),
            address_list_index: 0,
            selected_address: None,
            coordinator: None,
            is_loading: false,
            error_message: None,
        }
    }

    pub(crate) fn select_current_address(&mut self) -> Option<Address> {
        let address = self.address_results.get(self.address_list_index).cloned()?;
        self.selected_address = Some(address.clone());
        Some(address)
    }

    /// Leave the dashboard, stopping the background polling first.
    pub(crate) fn close_dashboard(&mut self) {
        if let Some(mut coordinator) = self.coordinator.take() {
            coordinator.shutdown();
        }
        self.selected_address = None;
        self.screen = Screen::AddressSelect;
    }
}
