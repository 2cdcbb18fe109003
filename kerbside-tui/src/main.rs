//! Terminal dashboard for watching a household's kerbside collections.

mod app;
mod input;
mod ui;

use std::{io, sync::Arc, time::Duration as StdDuration};

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::EnvFilter;

use kerbside_core::{
    coordinator::CollectionCoordinator,
    ports::{AddressPort, CollectionPort},
};
use kerbside_provider_southglos::SouthGlosProvider;

use crate::app::{App, Screen};
use crate::input::Action;

#[tokio::main]
async fn main() -> Result<()> {
    // The terminal belongs to ratatui; logs go to a daily file instead.
    let file_appender = rolling::daily("logs", "kerbside.log");
    let (log_writer, _log_guard) = non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(log_writer)
        .with_ansi(false)
        .init();

    // HTTP + provider setup
    let client = Client::builder().user_agent("kerbside/0.1").build()?;
    let provider = Arc::new(SouthGlosProvider::new(client));

    // App state
    let app = App::new(provider);

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        // Draw current UI; the short poll timeout below doubles as the
        // redraw tick that picks up background refreshes.
        terminal.draw(|frame| ui::draw(frame, &app))?;

        if event::poll(StdDuration::from_millis(250))?
            && let CEvent::Key(key) = event::read()?
        {
            let action = input::handle_key_event(key, &mut app);

            match action {
                Action::Quit => break,
                Action::None => {}
                Action::ResolveAddresses => {
                    let postcode = app.postcode_input.trim().to_owned();
                    if postcode.is_empty() {
                        app.error_message = Some("Type a postcode, then press Enter".into());
                        continue;
                    }

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let res = app.provider.resolve_addresses(&postcode).await;

                    app.is_loading = false;
                    match res {
                        Ok(addresses) if addresses.is_empty() => {
                            app.error_message =
                                Some("No addresses found for that postcode".into());
                        }
                        Ok(addresses) => {
                            app.address_results = addresses;
                            app.address_list_index = 0;
                            app.screen = Screen::AddressSelect;
                        }
                        Err(err) => {
                            app.error_message = Some(format!("Address lookup failed: {err}"));
                        }
                    }
                }
                Action::StartWatching => {
                    let Some(address) = app.select_current_address() else {
                        app.error_message = Some("No address selected".into());
                        continue;
                    };

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let port: Arc<dyn CollectionPort> = app.provider.clone();
                    let mut coordinator = CollectionCoordinator::new(address.uprn.clone(), port);
                    let res = coordinator.refresh().await;

                    app.is_loading = false;
                    match res {
                        Ok(_) => {
                            coordinator.start();
                            app.coordinator = Some(coordinator);
                            app.screen = Screen::Dashboard;
                        }
                        Err(err) => {
                            app.selected_address = None;
                            app.error_message = Some(format!("Could not load collections: {err}"));
                        }
                    }
                }
                Action::RefreshNow => {
                    let Some(coordinator) = &app.coordinator else {
                        continue;
                    };

                    app.is_loading = true;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let res = coordinator.refresh().await;

                    app.is_loading = false;
                    match res {
                        Ok(_) => app.error_message = None,
                        Err(err) => {
                            // Keep showing the stale snapshot; just say so.
                            app.error_message = Some(format!("Refresh failed: {err}"));
                        }
                    }
                }
            }
        }
    }

    // Stop polling before the terminal goes away.
    if let Some(mut coordinator) = app.coordinator.take() {
        coordinator.shutdown();
    }

    Ok(())
}
