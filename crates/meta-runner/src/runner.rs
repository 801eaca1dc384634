//! Windowed host.
//!
//! Owns the window, the `pixels` surface, the input fusion, the frame
//! scheduler and the audio relay, and wires window events to them. Ticks
//! run on `RedrawRequested`, which the vsynced surface paces to the display
//! refresh.

use std::sync::Arc;
use std::time::Instant;

use meta_core::Engine;
use pixels::{Pixels, SurfaceTexture};
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, MouseButton, Touch, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::audio::{AudioRelay, CpalSink};
use crate::config::{Background, ConfigEffect, HostConfig};
use crate::input::fusion::{InputFusion, PointerId};
use crate::input::gamepad::GilrsPoller;
use crate::loader::{AcquiredProgram, Deliver, LoadError, ProgramLoader, ProgramSource};
use crate::scheduler::{FrameScheduler, SchedulerState};
use crate::skin::{Compositor, Layout};

/// Window settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Window title.
    pub title: String,
    /// Integer window scale. Defaults to 1 with the console art and 4 for
    /// the bare screen.
    pub scale: Option<u32>,
    /// Program to load at start, taking precedence over the configured
    /// source.
    pub program: Option<ProgramSource>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            title: "Gamebuino META".to_string(),
            scale: None,
            program: None,
        }
    }
}

impl RunnerConfig {
    fn scale_for(&self, layout: Layout) -> u32 {
        self.scale
            .unwrap_or(if layout.pointer_regions { 1 } else { 4 })
            .max(1)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("cannot create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("cannot create drawing surface: {0}")]
    Pixels(#[from] pixels::Error),

    #[error("cannot resize drawing surface: {0}")]
    Texture(#[from] pixels::TextureError),
}

/// Events posted to the event loop from other threads.
#[derive(Debug)]
pub enum HostEvent {
    /// Stage one of a load finished.
    Program(AcquiredProgram),
    /// Change one option, as [`HostConfig::set_option`].
    SetOption { name: String, value: String },
}

impl Deliver for EventLoopProxy<HostEvent> {
    fn deliver(&self, program: AcquiredProgram) {
        if self.send_event(HostEvent::Program(program)).is_err() {
            log::debug!("Load result dropped: event loop closed");
        }
    }
}

/// What the host does next after a user event.
#[derive(Debug)]
enum Followup {
    /// Stage two of a load.
    Load(Result<Vec<u8>, LoadError>),
    /// Configuration effects to apply.
    Apply(Vec<ConfigEffect>),
    Nothing,
}

/// Apply one option change to `config`. Rejected changes are logged and
/// leave `config` as it was.
fn change_option(config: &mut HostConfig, name: &str, value: &str) -> Vec<ConfigEffect> {
    match config.set_option(name, value) {
        Ok(effects) => effects,
        Err(e) => {
            log::warn!("{e}");
            Vec::new()
        }
    }
}

fn dispatch<D: Deliver>(
    event: HostEvent,
    config: &mut HostConfig,
    loader: &mut ProgramLoader<D>,
) -> Followup {
    match event {
        HostEvent::Program(program) => loader
            .accept(program)
            .map_or(Followup::Nothing, Followup::Load),
        HostEvent::SetOption { name, value } => {
            Followup::Apply(change_option(config, &name, &value))
        }
    }
}

/// Open a window and run `factory`'s engines until the window closes.
pub fn run<E: Engine + 'static>(
    factory: impl FnMut() -> E + 'static,
    config: RunnerConfig,
    host_config: HostConfig,
) -> Result<(), HostError> {
    run_with_proxy(factory, config, host_config, |_| {})
}

/// Like [`run`], but first hands `on_start` a proxy through which other
/// threads can post [`HostEvent::SetOption`] while the window is open.
pub fn run_with_proxy<E: Engine + 'static>(
    factory: impl FnMut() -> E + 'static,
    config: RunnerConfig,
    host_config: HostConfig,
    on_start: impl FnOnce(EventLoopProxy<HostEvent>),
) -> Result<(), HostError> {
    let event_loop = EventLoop::<HostEvent>::with_user_event().build()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    on_start(event_loop.create_proxy());

    let mut host = Host::new(factory, config, host_config, event_loop.create_proxy());
    event_loop.run_app(&mut host)?;
    host.error.map_or(Ok(()), Err)
}

struct Host<E: Engine> {
    config: RunnerConfig,
    host_config: HostConfig,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    compositor: Compositor,
    scheduler: FrameScheduler<E>,
    audio: AudioRelay<CpalSink>,
    input: InputFusion<Option<GilrsPoller>>,
    loader: ProgramLoader<EventLoopProxy<HostEvent>>,
    cursor: Option<PhysicalPosition<f64>>,
    start: Instant,
    error: Option<HostError>,
}

impl<E: Engine> Host<E> {
    fn new(
        factory: impl FnMut() -> E + 'static,
        config: RunnerConfig,
        host_config: HostConfig,
        proxy: EventLoopProxy<HostEvent>,
    ) -> Self {
        Self {
            compositor: Compositor::new(host_config.background),
            config,
            host_config,
            window: None,
            pixels: None,
            scheduler: FrameScheduler::new(factory),
            audio: AudioRelay::new(CpalSink::open),
            input: InputFusion::new(GilrsPoller::new()),
            loader: ProgramLoader::new(proxy),
            cursor: None,
            start: Instant::now(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: HostError) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), HostError> {
        let layout = self.compositor.layout();
        let scale = self.config.scale_for(layout);
        let mut attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(layout.width * scale, layout.height * scale))
            .with_min_inner_size(LogicalSize::new(layout.width, layout.height));
        if self.host_config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attributes)?);

        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let mut pixels = Pixels::new(layout.width, layout.height, surface)?;
        pixels.frame_mut().copy_from_slice(self.compositor.surface());

        window.request_redraw();
        self.window = Some(window);
        self.pixels = Some(pixels);
        Ok(())
    }

    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    /// Apply a configuration change.
    fn set_option(&mut self, event_loop: &ActiveEventLoop, name: &str, value: &str) {
        let effects = change_option(&mut self.host_config, name, value);
        self.apply(event_loop, &effects);
    }

    fn apply(&mut self, event_loop: &ActiveEventLoop, effects: &[ConfigEffect]) {
        for effect in effects {
            match *effect {
                ConfigEffect::Reload => {
                    if let Some(source) = &self.host_config.source {
                        self.loader.request(ProgramSource::parse(source));
                    }
                }
                ConfigEffect::Relayout => {
                    if let Err(e) = self.relayout() {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                ConfigEffect::Fullscreen(on) => {
                    if let Some(window) = &self.window {
                        window.set_fullscreen(on.then_some(Fullscreen::Borderless(None)));
                    }
                }
            }
        }
    }

    fn relayout(&mut self) -> Result<(), HostError> {
        self.compositor.relayout(self.host_config.background);
        // Contacts resolved against the old surface no longer mean anything.
        self.input.cancel_all();
        let layout = self.compositor.layout();
        if let Some(pixels) = &mut self.pixels {
            pixels.resize_buffer(layout.width, layout.height)?;
            pixels.frame_mut().copy_from_slice(self.compositor.surface());
        }
        if let Some(window) = &self.window {
            let scale = self.config.scale_for(layout);
            let _ = window.request_inner_size(LogicalSize::new(
                layout.width * scale,
                layout.height * scale,
            ));
        }
        self.request_redraw();
        Ok(())
    }

    /// Stage two: hand acquired bytes to the scheduler.
    fn finish_load(&mut self, result: Result<Vec<u8>, LoadError>) {
        let loaded = result.and_then(|bytes| {
            self.scheduler
                .load(&bytes, &mut self.audio)
                .map_err(LoadError::from)
                .map(|_| bytes.len())
        });
        match loaded {
            Ok(len) => {
                log::info!("Program loaded ({len} bytes)");
                self.request_redraw();
            }
            Err(e @ LoadError::Engine(_)) => {
                log::error!("Load failed: {e}");
                // The old engine is gone; clear its last frame.
                self.compositor.relayout(self.host_config.background);
                if let Some(pixels) = &mut self.pixels {
                    pixels.frame_mut().copy_from_slice(self.compositor.surface());
                }
                self.request_redraw();
            }
            Err(e) => log::error!("Load failed: {e}"),
        }
    }

    fn open_dialog(&mut self, event_loop: &ActiveEventLoop) {
        let picked = rfd::FileDialog::new()
            .set_title("Open META program")
            .add_filter("META program", &["bin"])
            .add_filter("All files", &["*"])
            .pick_file();
        if let Some(path) = picked {
            self.set_option(event_loop, "source", &path.to_string_lossy());
        }
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode, state: ElementState, repeat: bool) {
        match state {
            ElementState::Pressed => {
                self.audio.activate();
                if self.input.key_down(code).consumes_key() {
                    return;
                }
                if repeat {
                    return;
                }
                match code {
                    KeyCode::Escape => event_loop.exit(),
                    KeyCode::F11 => {
                        let value = if self.host_config.fullscreen { "false" } else { "true" };
                        self.set_option(event_loop, "fullscreen", value);
                    }
                    KeyCode::F10 => {
                        let next = match self.host_config.background {
                            Background::Console => Background::None,
                            Background::None => Background::Console,
                        };
                        self.set_option(event_loop, "background", &next.to_string());
                    }
                    KeyCode::KeyO => self.open_dialog(event_loop),
                    _ => {}
                }
            }
            ElementState::Released => {
                self.input.key_up(code);
            }
        }
    }

    /// Map a window position to control-surface coordinates. `None` when the
    /// position falls outside the surface or pointers are disabled.
    fn surface_position(&self, position: PhysicalPosition<f64>) -> Option<(f64, f64)> {
        if !self.compositor.layout().pointer_regions {
            return None;
        }
        let pixels = self.pixels.as_ref()?;
        let (x, y) = pixels
            .window_pos_to_pixel((position.x as f32, position.y as f32))
            .ok()?;
        Some((x as f64, y as f64))
    }

    fn on_pointer_down(&mut self, id: PointerId, position: PhysicalPosition<f64>) {
        self.audio.activate();
        if let Some((x, y)) = self.surface_position(position) {
            self.input.pointer_down(id, x, y);
        }
    }

    fn on_pointer_move(&mut self, id: PointerId, position: PhysicalPosition<f64>) {
        if let Some((x, y)) = self.surface_position(position) {
            self.input.pointer_move(id, x, y);
        }
    }

    fn on_touch(&mut self, touch: Touch) {
        let id = PointerId::Touch(touch.id);
        match touch.phase {
            TouchPhase::Started => self.on_pointer_down(id, touch.location),
            TouchPhase::Moved => self.on_pointer_move(id, touch.location),
            TouchPhase::Ended | TouchPhase::Cancelled => self.input.pointer_up(id),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(token) = self.scheduler.pending() {
            let now = self.now_ms();
            self.scheduler.tick(
                token,
                now,
                &mut self.input,
                &mut self.compositor,
                &mut self.audio,
            );
            if let Some(pixels) = &mut self.pixels {
                pixels.frame_mut().copy_from_slice(self.compositor.surface());
            }
        }

        if let Some(Err(e)) = self.pixels.as_ref().map(Pixels::render) {
            self.fail(event_loop, e.into());
            return;
        }

        if self.scheduler.state() == SchedulerState::Running {
            self.request_redraw();
        }
    }
}

impl<E: Engine> ApplicationHandler<HostEvent> for Host<E> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window(event_loop) {
            self.fail(event_loop, e);
            return;
        }
        self.start = Instant::now();

        if let Some(program) = self.config.program.take() {
            self.loader.request(program);
        } else if let Some(source) = &self.host_config.source {
            self.loader.request(ProgramSource::parse(source));
        } else {
            log::info!("No program given; press O to open one or drop a file on the window");
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HostEvent) {
        match dispatch(event, &mut self.host_config, &mut self.loader) {
            Followup::Load(result) => self.finish_load(result),
            Followup::Apply(effects) => self.apply(event_loop, &effects),
            Followup::Nothing => {}
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    let resized = self
                        .pixels
                        .as_mut()
                        .map(|pixels| pixels.resize_surface(size.width, size.height));
                    if let Some(Err(e)) = resized {
                        self.fail(event_loop, e.into());
                    }
                }
            }

            WindowEvent::Focused(false) => self.input.cancel_all(),

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.on_key(event_loop, code, event.state, event.repeat);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some(position);
                self.on_pointer_move(PointerId::Mouse, position);
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    if let Some(position) = self.cursor {
                        self.on_pointer_down(PointerId::Mouse, position);
                    }
                }
                ElementState::Released => self.input.pointer_up(PointerId::Mouse),
            },

            WindowEvent::Touch(touch) => self.on_touch(touch),

            WindowEvent::DroppedFile(path) => {
                self.set_option(event_loop, "source", &path.to_string_lossy());
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.loader.cancel();
        self.scheduler.unload();
    }
}
