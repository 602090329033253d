use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

use portal_points::{
    load_obj_from_str, IntroTween, OrbitCamera, PortalScene, Renderer, SceneConfig,
};

const DRAG_SENSITIVITY: f32 = 0.005;
const INTRO_DURATION: f32 = 2.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let data = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read model {}", options.path))?;
    let model = load_obj_from_str(&data).context("failed to parse OBJ model")?;

    println!("Loaded model with {} meshes", model.meshes.len());
    for entry in &model.meshes {
        println!(" - {} ({} triangles)", entry.name, entry.mesh.triangle_count());
    }

    let mut config = SceneConfig::default();
    if let Some(samples) = options.samples {
        config.sample_count = samples;
    }
    if let Some(seed) = options.seed {
        config.seed = seed;
    }

    // The draw order is computed once, against the camera's starting
    // view, and reused while the camera orbits.
    let camera = OrbitCamera::new(Vec3::new(-4.0, 2.0, -4.0), Vec3::ZERO);
    let initial_view = camera.params(16.0 / 9.0);
    let scene = PortalScene::assemble(&model, &config, initial_view.view_proj)
        .context("failed to assemble scene")?;
    print_scene_summary(&config, &scene);

    if options.summary_only {
        return Ok(());
    }

    match run_interactive(&scene, camera) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn print_scene_summary(config: &SceneConfig, scene: &PortalScene) {
    println!(
        "Sampled {} points from '{}' ({} props)",
        scene.points.len(),
        config.point_source,
        scene.props.len()
    );
    if let Some((min, max)) = scene.points.size_range() {
        println!(" - sizes in [{min:.2}, {max:.2}]");
    }
    if let Some((min, max)) = scene.points.bounds() {
        println!(
            " - bounds min=({:.2}, {:.2}, {:.2}) max=({:.2}, {:.2}, {:.2})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }
    println!(" - draw order covers {} points", scene.draw_order.len());
}

fn run_interactive(scene: &PortalScene, camera: OrbitCamera) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop =
        event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Portal Points")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(Arc::clone(&window), scene))?;
    info!("renderer ready; starting intro transition");

    let mut app = AppState {
        renderer,
        camera,
        tween: IntroTween::new(INTRO_DURATION),
        dragging: false,
        last_cursor: None,
        last_frame: Instant::now(),
        last_error: None,
    };

    let mut event_loop = event_loop;
    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        if let Err(err) = app.process_event(&event, control_flow) {
            app.last_error = Some(err);
            control_flow.set_exit();
        }
    });

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    renderer: Renderer,
    camera: OrbitCamera,
    tween: IntroTween,
    dragging: bool,
    last_cursor: Option<Vec2>,
    last_frame: Instant,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn process_event(&mut self, event: &Event<()>, control_flow: &mut ControlFlow) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        control_flow.set_exit();
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed
                            && input.virtual_keycode == Some(VirtualKeyCode::Escape)
                        {
                            control_flow.set_exit();
                        }
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        self.renderer.resize(**new_inner_size);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        if *button == MouseButton::Left {
                            self.dragging = *state == ElementState::Pressed;
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let cursor = Vec2::new(position.x as f32, position.y as f32);
                        if let (true, Some(last)) = (self.dragging, self.last_cursor) {
                            let delta = (cursor - last) * DRAG_SENSITIVITY;
                            self.camera.rotate(delta.x, delta.y);
                        }
                        self.last_cursor = Some(cursor);
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let amount = match delta {
                            MouseScrollDelta::LineDelta(_, y) => *y * 0.5,
                            MouseScrollDelta::PixelDelta(position) => position.y as f32 * 0.01,
                        };
                        self.camera.dolly(amount);
                    }
                    _ => {}
                }
            }
            Event::RedrawRequested(window_id) if *window_id == self.renderer.window_id() => {
                let now = Instant::now();
                let dt = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;

                self.camera.update(dt);
                self.tween.advance(dt);
                let params = self.camera.params(self.renderer_aspect());
                self.renderer.update_globals(&params, self.tween.progress());
                if let Err(err) = self.renderer.render(self.tween.background()) {
                    match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            let size = self.renderer.window().inner_size();
                            self.renderer.resize(size);
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            return Err(anyhow!("GPU is out of memory"));
                        }
                        wgpu::SurfaceError::Timeout => {
                            info!("Surface timeout; retrying next frame");
                        }
                    }
                }
            }
            Event::MainEventsCleared => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn renderer_aspect(&self) -> f32 {
        let size = self.renderer.window().inner_size();
        if size.height == 0 {
            1.0
        } else {
            size.width as f32 / size.height as f32
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

struct CliOptions {
    path: String,
    samples: Option<usize>,
    seed: Option<u64>,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: portal-points <model.obj> [--samples N] [--seed S] [--summary-only]"
            ));
        };
        let mut samples = None;
        let mut seed = None;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--samples" => {
                    let value = args.next().ok_or_else(|| anyhow!("--samples needs a value"))?;
                    samples = Some(value.parse::<usize>().context("invalid --samples value")?);
                }
                "--seed" => {
                    let value = args.next().ok_or_else(|| anyhow!("--seed needs a value"))?;
                    seed = Some(value.parse::<u64>().context("invalid --seed value")?);
                }
                "--summary-only" => summary_only = true,
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --samples, --seed or --summary-only"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            samples,
            seed,
            summary_only,
        })
    }
}
