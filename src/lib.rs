pub mod controller;
pub mod dom;
pub mod engine;
pub mod error;
pub mod highlight;
pub mod hotkey;
pub mod message;
pub mod persistence;
pub mod platform;
pub mod popup;
pub mod reader;
pub mod state;

#[cfg(feature = "desktop")]
mod commands;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;

    use controller::SpeechController;
    use persistence::SettingsStore;
    use reader::Reader;
    use state::AppState;
    use tauri::{
        menu::{Menu, MenuItem, PredefinedMenuItem},
        tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent},
        Emitter, Manager,
    };

    tracing_subscriber::fmt::init();

    tracing::info!("Starting Read Anything v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .plugin(tauri_plugin_global_shortcut::Builder::new().build())
        .plugin(tauri_plugin_store::Builder::new().build())
        .plugin(tauri_plugin_notification::init())
        .invoke_handler(tauri::generate_handler![
            commands::tts::report_selection,
            commands::tts::read_selection,
            commands::tts::speak_selected_text,
            commands::tts::speak_text,
            commands::tts::stop_speaking,
            commands::tts::get_voices,
            commands::tts::send_message,
            commands::tts::pointer_event,
            commands::tts::get_status,
            commands::settings::get_settings,
            commands::settings::save_settings,
            commands::settings::get_voice_picker,
            commands::settings::get_shortcut_labels,
            commands::settings::get_app_version,
        ])
        .setup(|app| {
            #[cfg(target_os = "macos")]
            {
                use objc2_app_kit::NSApplication;
                use objc2_app_kit::NSApplicationActivationPolicy;
                let mtm = unsafe { objc2::MainThreadMarker::new_unchecked() };
                let ns_app = NSApplication::sharedApplication(mtm);
                ns_app.setActivationPolicy(NSApplicationActivationPolicy::Accessory);
            }

            let store = Arc::new(SettingsStore::for_app(app.handle()));
            let settings = store.load();
            tracing::info!("Settings loaded from store");

            let synth = Arc::new(engine::system::SystemSynthesizer::spawn()?);
            let highlighter = Arc::new(platform::WebviewHighlighter::new(app.handle().clone()));
            let notifier = Arc::new(platform::AppNotifier::new(app.handle().clone()));
            let (controller, pump) = SpeechController::new(settings.clone(), synth, highlighter, notifier);
            tauri::async_runtime::spawn(pump.run());

            {
                let mut status = controller.subscribe_status();
                let app_handle = app.handle().clone();
                tauri::async_runtime::spawn(async move {
                    while status.changed().await.is_ok() {
                        let current = *status.borrow_and_update();
                        let _ = app_handle.emit("reading-status", serde_json::json!({ "status": current }));
                    }
                });
            }

            let selection = Arc::new(std::sync::Mutex::new(None));
            let selector = Arc::new(platform::WebviewSelector::new(selection.clone()));
            let reader = Arc::new(Reader::new(controller, selector, store.clone()));
            app.manage(AppState {
                reader,
                store,
                selection,
            });

            let shortcuts = &settings.shortcuts;
            let read_label = format!(
                "Read Selection ({})",
                hotkey::shortcut_display_label(&shortcuts.accelerator(&shortcuts.read_now))
            );
            let stop_label = format!(
                "Stop Reading ({})",
                hotkey::shortcut_display_label(&shortcuts.accelerator(&shortcuts.stop))
            );

            let read_selection = MenuItem::with_id(app, "read_selection", &read_label, true, None::<&str>)?;
            let stop_reading = MenuItem::with_id(app, "stop_reading", &stop_label, true, None::<&str>)?;
            let show_settings = MenuItem::with_id(
                app,
                "show_settings",
                "Preferences...",
                true,
                Some("CmdOrCtrl+,"),
            )?;
            let quit = MenuItem::with_id(app, "quit", "Quit", true, Some("CmdOrCtrl+Q"))?;

            let separator1 = PredefinedMenuItem::separator(app)?;
            let separator2 = PredefinedMenuItem::separator(app)?;

            let menu = Menu::with_items(
                app,
                &[
                    &read_selection,
                    &stop_reading,
                    &separator1,
                    &show_settings,
                    &separator2,
                    &quit,
                ],
            )?;

            let mut tray = TrayIconBuilder::new()
                .menu(&menu)
                .tooltip("Read Anything")
                .on_menu_event(|app, event| match event.id.as_ref() {
                    "read_selection" => {
                        app.state::<AppState>().reader.read_now();
                    }
                    "stop_reading" => {
                        app.state::<AppState>().reader.stop();
                    }
                    "show_settings" => {
                        hotkey::global::show_settings(app);
                    }
                    "quit" => {
                        app.exit(0);
                    }
                    _ => {}
                })
                .on_tray_icon_event(|tray, event| {
                    if let TrayIconEvent::Click {
                        button: MouseButton::Left,
                        button_state: MouseButtonState::Up,
                        ..
                    } = event
                    {
                        hotkey::global::show_settings(tray.app_handle());
                    }
                });
            if let Some(icon) = app.default_window_icon() {
                tray = tray.icon(icon.clone());
            }
            let _tray = tray.build(app)?;

            if let Err(e) = hotkey::global::register_shortcuts(app.handle(), &settings.shortcuts) {
                tracing::warn!("Failed to register reading shortcuts: {:#}", e);
            }

            if let Some(window) = app.get_webview_window("main") {
                let w = window.clone();
                window.on_window_event(move |event| {
                    if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                        api.prevent_close();
                        let _ = w.hide();
                    }
                });
            }

            tracing::info!("App setup complete");

            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let tauri::RunEvent::Exit = event {
                app_handle.state::<AppState>().reader.controller().shutdown();
            }
        });
}
