//! Narrow external-collaborator traits the coordinator calls at finalization
//! (spec.md §6 "Sink PDF generator": "layout-agnostic... returns a `File`
//! reference").

use async_trait::async_trait;
use quote_types::{File, QuoteRequest, QuoteSource};

/// One accepted quotation, ready to be rendered into a document.
pub struct QuotePacket<'a> {
	pub request: &'a QuoteRequest,
	pub accepted_sources: &'a [QuoteSource],
	pub vehicle_row: Option<&'a quote_types::vehicle::VehiclePriceBank>,
}

#[async_trait]
pub trait PdfSink: Send + Sync {
	async fn generate(&self, packet: QuotePacket<'_>) -> Result<File, String>;
}

/// No-op sink used where no document generator is configured; finalization
/// proceeds without a rendered document.
pub struct NullPdfSink;

#[async_trait]
impl PdfSink for NullPdfSink {
	async fn generate(&self, _packet: QuotePacket<'_>) -> Result<File, String> {
		Err("no PDF sink configured".to_string())
	}
}
