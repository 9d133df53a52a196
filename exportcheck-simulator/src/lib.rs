/*!
# exportcheck Simulator

The moving parts of a delivery-contract run: the concurrent generator that
feeds the exporter under test, the simulated receiver that injects failures,
and the transport that connects the two.

## Key Components:
- **Generator:** parallel workers allocating ids from one atomic counter.
- **Receiver:** records accepted and dropped ids under a single lock.
- **Transport:** in-process calls or length-delimited JSON over TCP.
- **Exporter:** collaborator traits and a reference retrying exporter.
*/

pub mod backoff;
pub mod exporter;
pub mod generator;
pub mod receiver;
pub mod transport;

pub use exporter::{
    ExportError, Exporter, ExporterFactory, RetryMode, RetryingExporter, RetryingExporterFactory,
};
pub use generator::{ConcurrentGenerator, GenerationReport};
pub use receiver::{ReceiverSnapshot, RequestCounters, SimulatedReceiver};
pub use transport::{
    BoundReceiver, Endpoint, ExportClient, ExportService, InProcessBinding, ReceiverBinding,
    Status, StatusCode, TcpBinding,
};
