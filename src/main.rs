use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::warn;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use umbra::physics::FIXED_TIMESTEP;
use umbra::{
    init_logging, print_final_state, EngineConfig, HeadlessBackend, InputState, KeyCode,
    LoggingConfig, NamedKey, RenderError, Simulation, WgpuBackend,
};

const DEFAULT_FRAMES: u64 = 120;

fn main() {
    init_logging(LoggingConfig::default());
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    println!(
        "Loaded config with {} model(s) and {} primitive(s)",
        config.models.len(),
        config.primitives.len()
    );

    if options.headless {
        return run_headless(&config, options.frames);
    }

    match run_interactive(config.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or install a GPU driver to enable rendering)."
                );
                run_headless(&config, options.frames)
            } else {
                Err(err)
            }
        }
    }
}

fn run_headless(config: &EngineConfig, frames: u64) -> Result<()> {
    let backend = HeadlessBackend::new(config.window.width, config.window.height);
    let mut simulation = Simulation::new(backend, config, Arc::new(InputState::new()));
    simulation.initialize(config)?;

    let mut last = None;
    for frame in 0..frames {
        let report = simulation
            .step(FIXED_TIMESTEP)
            .with_context(|| format!("frame {frame} failed"))?;
        last = Some(report);
    }

    let engine = simulation.engine();
    let backend = engine.backend();
    println!(
        "Rendered {} frame(s) from {} mesh(es) and {} texture(s)",
        engine.frames_rendered(),
        backend.mesh_count(),
        backend.texture_count()
    );
    if let Some(report) = last {
        println!(
            "Last frame: {} shadow draw(s), {} main draw(s)",
            report.shadow_draws, report.main_draws
        );
    }
    print_final_state(engine.objects());
    println!("Scene:");
    for line in simulation.panel().describe(engine.objects()) {
        println!("{line}");
    }
    Ok(())
}

fn run_interactive(config: EngineConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = InteractiveApp {
        config,
        input: Arc::new(InputState::new()),
        simulation: None,
        last_frame: Instant::now(),
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    if let Some(err) = app.last_error {
        return Err(err);
    }
    if let Some(simulation) = &app.simulation {
        print_final_state(simulation.engine().objects());
    }
    Ok(())
}

struct InteractiveApp {
    config: EngineConfig,
    input: Arc<InputState>,
    simulation: Option<Simulation<WgpuBackend>>,
    last_frame: Instant,
    last_error: Option<anyhow::Error>,
}

impl InteractiveApp {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Simulation<WgpuBackend>> {
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(self.config.window.title.as_str())
                    .with_inner_size(LogicalSize::new(
                        self.config.window.width as f64,
                        self.config.window.height as f64,
                    )),
            )
            .map_err(|err| WindowInitError::from_error("window", err))?;

        let backend = block_on(WgpuBackend::new(Arc::new(window)))
            .map_err(|err| WindowInitError::from_error("GPU", format!("{err:#}")))?;
        let mut simulation = Simulation::new(backend, &self.config, Arc::clone(&self.input));
        simulation.initialize(&self.config)?;
        Ok(simulation)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        match simulation.step(dt) {
            Ok(_) => {}
            Err(RenderError::Surface(
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
            )) => {
                let size = simulation.engine().backend().window().inner_size();
                simulation.resize(size.width, size.height);
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                self.fail(event_loop, anyhow!("GPU is out of memory"));
            }
            Err(RenderError::Surface(other)) => {
                warn!("surface {other}; skipping frame");
            }
            Err(err) => self.fail(event_loop, err.into()),
        }
    }

    fn handle_keyboard(&self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(key) = map_keycode(code) else {
            return;
        };
        match event.state {
            ElementState::Pressed => {
                if key == KeyCode::Named(NamedKey::Escape) {
                    event_loop.exit();
                }
                self.input.set_key_down(key);
            }
            ElementState::Released => self.input.set_key_up(key),
        }
    }
}

impl ApplicationHandler for InteractiveApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.simulation.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(simulation) => {
                self.last_frame = Instant::now();
                self.simulation = Some(simulation);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };
        if window_id != simulation.engine().backend().window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => simulation.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(event_loop, &event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(simulation) = &self.simulation {
            simulation.engine().backend().window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if self.last_error.is_some() {
            warn!("shutting down after an error");
        }
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn map_keycode(code: winit::keyboard::KeyCode) -> Option<KeyCode> {
    use winit::keyboard::KeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter => KeyCode::Named(NamedKey::Enter),
        Key::Tab => KeyCode::Named(NamedKey::Tab),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::PageUp => KeyCode::Named(NamedKey::PageUp),
        Key::PageDown => KeyCode::Named(NamedKey::PageDown),
        Key::Minus | Key::NumpadSubtract => KeyCode::Named(NamedKey::Minus),
        Key::Equal | Key::NumpadAdd => KeyCode::Named(NamedKey::Equal),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        Key::F1 => KeyCode::Function(1),
        Key::F2 => KeyCode::Function(2),
        Key::F3 => KeyCode::Function(3),
        Key::F4 => KeyCode::Function(4),
        Key::F5 => KeyCode::Function(5),
        Key::F6 => KeyCode::Function(6),
        Key::F7 => KeyCode::Function(7),
        Key::F8 => KeyCode::Function(8),
        Key::F9 => KeyCode::Function(9),
        Key::F10 => KeyCode::Function(10),
        Key::F11 => KeyCode::Function(11),
        Key::F12 => KeyCode::Function(12),
        _ => return None,
    })
}

#[derive(Debug)]
struct CliOptions {
    config: Option<PathBuf>,
    headless: bool,
    frames: u64,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut options = Self {
            config: None,
            headless: false,
            frames: DEFAULT_FRAMES,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames expects a number"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count `{value}`"))?;
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Usage: umbra [config.xml] [--headless] [--frames N]"
                    ));
                }
                path if options.config.is_none() => options.config = Some(PathBuf::from(path)),
                extra => return Err(anyhow!("Unexpected argument: {extra}")),
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn defaults_to_interactive_builtin_scene() {
        let options = parse(&[]).unwrap();
        assert!(options.config.is_none());
        assert!(!options.headless);
        assert_eq!(options.frames, DEFAULT_FRAMES);
    }

    #[test]
    fn parses_config_and_flags() {
        let options = parse(&["scene.xml", "--headless", "--frames", "10"]).unwrap();
        assert_eq!(options.config, Some(PathBuf::from("scene.xml")));
        assert!(options.headless);
        assert_eq!(options.frames, 10);
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(parse(&["--fast"]).is_err());
        assert!(parse(&["--frames", "many"]).is_err());
        assert!(parse(&["a.xml", "b.xml"]).is_err());
    }

    #[test]
    fn maps_letter_keys_to_uppercase() {
        assert_eq!(
            map_keycode(winit::keyboard::KeyCode::KeyQ),
            Some(KeyCode::Character('Q'))
        );
        assert_eq!(map_keycode(winit::keyboard::KeyCode::CapsLock), None);
    }
}
