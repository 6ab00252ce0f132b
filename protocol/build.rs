//! Generates the `fxstream.Currency` client and server from the message
//! types declared in `src/messages.rs`. Uses tonic's manual service builder,
//! so no `protoc` is needed at build time. `proto/currency.proto` documents
//! the same schema for non-Rust clients.

use tonic_build::manual::{Builder, Method, Service};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let currency = Service::builder()
        .name("Currency")
        .package("fxstream")
        .comment("Currency exchange rates, on request and as a live subscription.")
        .method(
            Method::builder()
                .name("get_rate")
                .route_name("GetRate")
                .comment("Returns the current cross rate for one pair.")
                .input_type("crate::messages::RateRequest")
                .output_type("crate::messages::RateResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("subscribe_rates")
                .route_name("SubscribeRates")
                .comment("Streams rate updates for every pair the client subscribes to.")
                .input_type("crate::messages::RateRequest")
                .output_type("crate::messages::StreamingRateResponse")
                .codec_path("tonic::codec::ProstCodec")
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[currency]);
}
