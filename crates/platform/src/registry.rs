//! Lookup from winit window ids to live windows.

use std::collections::HashMap;
use std::sync::Arc;

use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::window::Window;

/// What the event loop should do after a window event was routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowAction {
    /// Nothing beyond normal processing.
    None,
    /// The window asked to close and was removed from the registry.
    Closed,
    /// The window wants a frame drawn.
    Redraw,
}

/// Owns every open window and routes winit events to them.
#[derive(Default)]
pub struct WindowRegistry {
    windows: HashMap<WindowId, Arc<Window>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `window` and returns its id.
    pub fn insert(&mut self, window: Arc<Window>) -> WindowId {
        let id = window.id();
        self.windows.insert(id, window);
        id
    }

    pub fn get(&self, id: WindowId) -> Option<&Arc<Window>> {
        self.windows.get(&id)
    }

    pub fn remove(&mut self, id: WindowId) -> Option<Arc<Window>> {
        self.windows.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Window>> {
        self.windows.values()
    }

    /// Applies `event` to the window it targets. Events for unknown windows
    /// are ignored.
    pub fn handle_event(&mut self, id: WindowId, event: &WindowEvent) -> WindowAction {
        let Some(window) = self.windows.get(&id) else {
            return WindowAction::None;
        };

        match event {
            WindowEvent::Resized(size) => {
                window.resized(*size);
                WindowAction::None
            }
            WindowEvent::RedrawRequested => WindowAction::Redraw,
            WindowEvent::CloseRequested => {
                self.windows.remove(&id);
                tracing::info!("Window {:?} closed", id);
                WindowAction::Closed
            }
            _ => WindowAction::None,
        }
    }
}
