//! Sensor node ESP32 firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== Sensor node starting ===");

    if let Err(e) = run() {
        log::error!("Initialization failed: {}", e);
        // Nothing sensible left to do; stay idle so the log remains readable.
        loop {
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }
}

#[cfg(feature = "esp32")]
fn run() -> Result<(), iot_sensor_node::PlatformError> {
    use esp_idf_hal::gpio::{IOPin, OutputPin};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use iot_sensor_node::platform::esp32::{GpioButton, GpioLed};
    use iot_sensor_node::platform::net::UdpTransport;
    use iot_sensor_node::platform::sim::SimulatedSensor;
    use iot_sensor_node::platform::terminal::StdioConsole;
    use iot_sensor_node::wifi::{init_nvs, EspRadio};
    use iot_sensor_node::{Board, MonotonicClock, Node, NodeConfig};
    use std::time::Duration;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = init_nvs()?;
    let config = NodeConfig::default();

    // Status LED on GPIO2, credential button on GPIO0 (BOOT).
    let led = GpioLed::new(peripherals.pins.gpio2.downgrade_output())?;
    let button = GpioButton::new(peripherals.pins.gpio0.downgrade())?;

    // TODO: replace with an AT30TSE75x driver on I2C0 once the sensor board is wired.
    let sensor = SimulatedSensor::new();

    let board = Board {
        radio: Box::new(EspRadio::new(peripherals.modem, sysloop, nvs)?),
        transport: Box::new(UdpTransport::broadcast(config.server_port)),
        sensor: Box::new(sensor),
        led: Box::new(led),
        button: Box::new(button),
        console: Box::new(StdioConsole::new()),
    };

    let mut node = Node::new(config, board);
    node.start()?;

    log::info!("Entering main loop...");
    let clock = MonotonicClock::new();
    loop {
        node.poll(clock.now_ms());
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-node' to run the node on the host.");
}
