// SPDX-License-Identifier: MPL-2.0

//! Checks whether the running compositor can show DRM-PRIME overlays.
//!
//! Creates a bare surface, initializes the overlay under it, prints what the
//! compositor offers, clears the overlay once and tears everything down.

use drmprime_overlay::{Config, EmbedParams, OverlayDriver, Rect, WaylandPeer, status_code};
use eyre::WrapErr;
use sctk::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_output, delegate_registry,
    output::{OutputHandler, OutputState},
    reexports::client::{
        Connection, QueueHandle,
        globals::registry_queue_init,
        protocol::{wl_output, wl_surface},
    },
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    init_logger();

    let config = match Config::load() {
        Ok(conf) => conf,
        Err(why) => {
            warn!(?why, "Config file error, falling back to defaults");
            Config::default()
        }
    };

    let conn = Connection::connect_to_env().wrap_err("failed to connect to wayland")?;
    let (globals, mut event_queue) =
        registry_queue_init::<HostState>(&conn).wrap_err("failed to initialize registry")?;
    let qh = event_queue.handle();

    let compositor_state =
        CompositorState::bind(&globals, &qh).wrap_err("wl_compositor not available")?;

    let mut host = HostState {
        registry_state: RegistryState::new(&globals),
        output_state: OutputState::new(&globals, &qh),
        compositor_state,
    };
    event_queue.roundtrip(&mut host)?;

    let host_surface = host.compositor_state.create_surface(&qh);

    let embed = EmbedParams {
        connection: conn.clone(),
        compositor: host.compositor_state.wl_compositor().clone(),
        surface: host_surface.clone(),
    };
    let mut driver = OverlayDriver::new(WaylandPeer::new(embed), config);

    let result = driver.init();
    if status_code(&result) != 0 {
        host_surface.destroy();
        conn.flush()?;
        return result.wrap_err("overlay init failed");
    }

    let capabilities = driver.capabilities();
    println!("overlay driver: {}", driver.name());
    println!("wl_subcompositor: {:?}", capabilities.subcompositor);
    println!("zwp_linux_dmabuf_v1: {:?}", capabilities.dmabuf);
    for format in capabilities.formats.iter() {
        println!("  {format}");
    }

    driver
        .overlay_frame(None, Rect::default(), Rect::default(), false)
        .wrap_err("clearing overlay failed")?;
    driver.uninit();
    info!(stats = ?driver.tracker_stats(), "overlay torn down");
    drop(driver);

    host_surface.destroy();
    event_queue.roundtrip(&mut host)?;

    Ok(())
}

fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

struct HostState {
    registry_state: RegistryState,
    output_state: OutputState,
    compositor_state: CompositorState,
}

impl CompositorHandler for HostState {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for HostState {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }
}

delegate_compositor!(HostState);
delegate_output!(HostState);

delegate_registry!(HostState);

impl ProvidesRegistryState for HostState {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }
    registry_handlers![OutputState];
}
