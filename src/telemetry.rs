use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::Subscriber;
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

pub fn setup() -> Result<(), Box<dyn std::error::Error>> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(load_output_layer()?)
        .try_init()?;

    Ok(())
}

pub fn shutdown() {
    global::shutdown_tracer_provider();
}

fn load_otlp_headers() -> tonic::metadata::MetadataMap {
    let mut tracing_metadata = tonic::metadata::MetadataMap::new();

    match std::env::var("OTEL_EXPORTER_OTLP_HEADERS").ok() {
        Some(headers) if !headers.is_empty() => {
            for header in headers.split_terminator(',') {
                if let Some((key, value)) = header.split_once('=') {
                    let key = match tonic::metadata::MetadataKey::from_bytes(key.trim().as_bytes()) {
                        Ok(key) => key,
                        Err(_) => {
                            eprintln!("Could not parse header name {}.", key);
                            continue;
                        }
                    };

                    match value.trim().parse() {
                        Ok(value) => {
                            tracing_metadata.insert(key, value);
                        }
                        Err(_) => eprintln!("Could not parse value for header {}.", key.as_str()),
                    }
                }
            }
        }
        _ => {}
    }

    tracing_metadata
}

fn load_trace_sampler() -> opentelemetry_sdk::trace::Sampler {
    fn get_trace_ratio() -> f64 {
        std::env::var("OTEL_TRACES_SAMPLER_ARG")
            .ok()
            .and_then(|ratio| ratio.parse().ok())
            .unwrap_or(1.0)
    }

    match std::env::var("OTEL_TRACES_SAMPLER").as_deref() {
        Ok("always_on") => opentelemetry_sdk::trace::Sampler::AlwaysOn,
        Ok("always_off") => opentelemetry_sdk::trace::Sampler::AlwaysOff,
        Ok("traceidratio") => {
            opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(get_trace_ratio())
        }
        Ok("parentbased_always_on") => opentelemetry_sdk::trace::Sampler::ParentBased(Box::new(
            opentelemetry_sdk::trace::Sampler::AlwaysOn,
        )),
        Ok("parentbased_always_off") => opentelemetry_sdk::trace::Sampler::ParentBased(Box::new(
            opentelemetry_sdk::trace::Sampler::AlwaysOff,
        )),
        Ok("parentbased_traceidratio") => opentelemetry_sdk::trace::Sampler::ParentBased(Box::new(
            opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(get_trace_ratio()),
        )),
        _ => opentelemetry_sdk::trace::Sampler::AlwaysOn,
    }
}

fn load_output_layer<S>() -> Result<Box<dyn Layer<S> + Send + Sync + 'static>, Box<dyn std::error::Error>>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let tracing_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|endpoint| !endpoint.is_empty());

    if let Some(endpoint) = tracing_endpoint {
        let metadata = load_otlp_headers();
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint)
                    .with_metadata(metadata),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::config()
                    .with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "feed-poller"),
                        opentelemetry::KeyValue::new("service.version", version!("v")),
                        opentelemetry::KeyValue::new("host.os", std::env::consts::OS),
                        opentelemetry::KeyValue::new("host.architecture", std::env::consts::ARCH),
                    ]))
                    .with_sampler(load_trace_sampler()),
            )
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)?;

        Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
    } else {
        Ok(tracing_subscriber::fmt::layer().boxed())
    }
}
