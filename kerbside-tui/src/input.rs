use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Action {
    None,
    Quit,
    /// Run `provider.resolve_addresses`(...)
    ResolveAddresses,
    /// Build a coordinator for the selected address and start polling
    StartWatching,
    /// Ask the coordinator for a manual refresh
    RefreshNow,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Backspace, Char, Down, Enter, Esc, Left, Up};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::PostcodeEntry => match key.code {
            Char(character) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    app.postcode_input.push(character);
                }
            }
            Backspace => {
                app.postcode_input.pop();
            }
            Enter => {
                action = Action::ResolveAddresses;
            }
            Esc => {
                action = Action::Quit;
            }
            _ => {}
        },

        Screen::AddressSelect => match key.code {
            Up | Char('k') => {
                if app.address_list_index > 0 {
                    app.address_list_index -= 1;
                }
            }
            Down | Char('j') => {
                if app.address_list_index + 1 < app.address_results.len() {
                    app.address_list_index += 1;
                }
            }
            Enter | Char(' ') => {
                action = Action::StartWatching;
            }
            Char('q') => {
                action = Action::Quit;
            }
            Left | Esc => {
                app.screen = Screen::PostcodeEntry;
                app.address_results.clear();
                app.address_list_index = 0;
            }
            _ => {}
        },

        Screen::Dashboard => match key.code {
            Char('r') => {
                action = Action::RefreshNow;
            }
            Char('q') => {
                action = Action::Quit;
            }
            Left | Esc | Char('b') => {
                app.close_dashboard();
            }
            _ => {}
        },
    }
    action
}
