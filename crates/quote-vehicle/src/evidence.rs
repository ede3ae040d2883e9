//! FIPE site evidence capture, isolated behind one narrow trait (spec.md §9
//! "FIPE site automation is fragile... isolate it"). Drives the public
//! vehicle-price site with a deterministic script and either screenshots
//! the result table directly or falls back to a vertical crop of the full
//! page. Grounded on `fipe_screenshot.py`'s `FipeScreenshotService`.

use crate::FipeError;
use async_trait::async_trait;
use fantoccini::{ClientBuilder, Locator};
use image::GenericImageView;
use quote_types::{File, FileId, FileKind};
use std::path::PathBuf;
use std::time::Duration;

const URL_BASE: &str = "https://veiculos.fipe.org.br/";
const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;

/// Vertical crop bounds for the full-page screenshot fallback, in pixels
/// (spec.md §4.5 "a vertical crop of the full page (y 2162..3143)").
pub const CROP_Y_START: u32 = 2162;
pub const CROP_Y_END: u32 = 3143;

/// Which accordion section of the site to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
	Cars,
	Motorcycles,
	Trucks,
}

impl VehicleKind {
	pub fn api_segment(self) -> &'static str {
		match self {
			VehicleKind::Cars => "cars",
			VehicleKind::Motorcycles => "motorcycles",
			VehicleKind::Trucks => "trucks",
		}
	}

	fn accordion_xpath(self) -> &'static str {
		match self {
			VehicleKind::Cars => "//li[contains(@class, 'lista')]//a[contains(text(), 'Consulta de Carros')]",
			VehicleKind::Motorcycles => "//li[contains(@class, 'lista')]//a[contains(text(), 'Consulta de Motos')]",
			VehicleKind::Trucks => "//li[contains(@class, 'lista')]//a[contains(text(), 'Caminhões')]",
		}
	}

	fn code_field_selector(self) -> &'static str {
		match self {
			VehicleKind::Cars => "#selectCodigocarroCodigoFipe",
			VehicleKind::Motorcycles => "#selectCodigomotoCodigoFipe",
			VehicleKind::Trucks => "#selectCodigocaminhaoCodigoFipe",
		}
	}

	fn year_select_selector(self) -> &'static str {
		match self {
			VehicleKind::Cars => "#selectCodigoAnocarroCodigoFipe",
			VehicleKind::Motorcycles => "#selectCodigoAnomotoCodigoFipe",
			VehicleKind::Trucks => "#selectCodigoAnocaminhaoCodigoFipe",
		}
	}

	fn search_button_selector(self) -> &'static str {
		match self {
			VehicleKind::Cars => "#buttonPesquisarcarroPorCodigoFipe",
			VehicleKind::Motorcycles => "#buttonPesquisarmotoPorCodigoFipe",
			VehicleKind::Trucks => "#buttonPesquisarcaminhaoPorCodigoFipe",
		}
	}
}

/// Parameters for one evidence-capture run.
pub struct FipeEvidenceParams {
	pub file_id: FileId,
	pub storage_dir: PathBuf,
	pub vehicle_kind: VehicleKind,
	pub codigo_fipe: String,
	/// The visible dropdown label to match, e.g. "2020 Flex" — the year
	/// string the API actually returned, never a pre-computed fuel code
	/// (spec.md §4.5 step 2).
	pub year_label: String,
}

/// Isolates the fragile site-automation driver behind one method (spec.md
/// §9's explicit isolation note).
#[async_trait]
pub trait FipeEvidenceCapture: Send + Sync {
	async fn capture_evidence(&self, params: &FipeEvidenceParams) -> Result<File, FipeError>;
}

fn evidence_err(e: impl std::fmt::Display) -> FipeError {
	FipeError::Evidence(e.to_string())
}

pub struct WebDriverFipeCapture {
	webdriver_url: String,
}

impl WebDriverFipeCapture {
	pub fn new(webdriver_url: String) -> Self {
		Self { webdriver_url }
	}
}

#[async_trait]
impl FipeEvidenceCapture for WebDriverFipeCapture {
	async fn capture_evidence(&self, params: &FipeEvidenceParams) -> Result<File, FipeError> {
		let client = ClientBuilder::native()
			.connect(&self.webdriver_url)
			.await
			.map_err(evidence_err)?;

		let result = run_capture(&client, params).await;
		let _ = client.close().await;
		result
	}
}

async fn run_capture(client: &fantoccini::Client, params: &FipeEvidenceParams) -> Result<File, FipeError> {
	client.set_window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT).await.map_err(evidence_err)?;
	client.goto(URL_BASE).await.map_err(evidence_err)?;
	tokio::time::sleep(Duration::from_millis(1000)).await;

	click(client, Locator::XPath(params.vehicle_kind.accordion_xpath())).await?;
	tokio::time::sleep(Duration::from_millis(500)).await;

	click(
		client,
		Locator::XPath("//a[contains(text(), 'código Fipe') or contains(text(), 'Código Fipe')]"),
	)
	.await?;
	tokio::time::sleep(Duration::from_millis(800)).await;

	let field_selector = params.vehicle_kind.code_field_selector();
	let field = client
		.wait()
		.for_element(Locator::Css(field_selector))
		.await
		.map_err(evidence_err)?;
	field.click().await.map_err(evidence_err)?;
	field.send_keys(&params.codigo_fipe).await.map_err(evidence_err)?;
	dispatch_change_blur(client, field_selector).await?;

	// Triggers the AJAX call that populates the year dropdown.
	tokio::time::sleep(Duration::from_secs(3)).await;

	select_year_option(client, params.vehicle_kind.year_select_selector(), &params.year_label).await?;

	click(client, Locator::Css(params.vehicle_kind.search_button_selector())).await?;
	tokio::time::sleep(Duration::from_secs(2)).await;

	client
		.wait()
		.for_element(Locator::Css("table.tabelaResultado"))
		.await
		.map_err(|e| FipeError::Evidence(format!("result table did not appear: {e}")))?;

	let png = capture_table_or_crop(client).await?;

	let sha256 = File::content_hash(&png);
	let filename = format!("fipe_screenshot_{}.png", params.file_id.0.simple());
	let storage_path = params.storage_dir.join(&filename);
	tokio::fs::write(&storage_path, &png).await.map_err(evidence_err)?;

	Ok(File {
		id: params.file_id,
		kind: FileKind::Screenshot,
		mime: "image/png".to_string(),
		storage_path: storage_path.to_string_lossy().to_string(),
		sha256,
		created_at: chrono::Utc::now(),
	})
}

async fn click(client: &fantoccini::Client, locator: Locator<'_>) -> Result<(), FipeError> {
	let el = client.wait().for_element(locator).await.map_err(evidence_err)?;
	el.click().await.map_err(evidence_err)
}

async fn dispatch_change_blur(client: &fantoccini::Client, selector: &str) -> Result<(), FipeError> {
	let script = format!(
		"var el = document.querySelector({selector:?}); \
		 el.dispatchEvent(new Event('change', {{bubbles: true}})); \
		 el.dispatchEvent(new Event('blur', {{bubbles: true}}));",
	);
	client.execute(&script, vec![]).await.map_err(evidence_err)?;
	Ok(())
}

/// Reads the year select's options and sets its value via a plain DOM
/// `change` event. The original drives a jQuery Chosen widget directly;
/// dispatching `change` on the underlying (hidden but functional) `<select>`
/// achieves the same effect without depending on jQuery being present.
async fn select_year_option(client: &fantoccini::Client, select_selector: &str, year_label: &str) -> Result<(), FipeError> {
	let script = format!(
		"return Array.from(document.querySelector({selector:?}).options).map(o => [o.value, o.textContent.trim()]);",
	);
	let options = client.execute(&script, vec![]).await.map_err(evidence_err)?;
	let options = options.as_array().ok_or_else(|| FipeError::Evidence("year select has no options".to_string()))?;

	let label_lower = year_label.to_lowercase();
	let mut matched_value = find_option_value(options, |text| text == label_lower);

	if matched_value.is_none() {
		if let Some(digits) = label_lower.split_whitespace().next() {
			matched_value = find_option_value(options, |text| text.starts_with(digits));
		}
	}

	let value = matched_value.ok_or_else(|| FipeError::Evidence(format!("year option not found: {year_label}")))?;

	let set_script = format!(
		"var s = document.querySelector({selector:?}); s.value = {value:?}; \
		 s.dispatchEvent(new Event('change', {{bubbles: true}}));",
	);
	client.execute(&set_script, vec![]).await.map_err(evidence_err)?;
	Ok(())
}

fn find_option_value(options: &[serde_json::Value], predicate: impl Fn(&str) -> bool) -> Option<String> {
	options.iter().find_map(|opt| {
		let pair = opt.as_array()?;
		let value = pair.first()?.as_str()?;
		let text = pair.get(1)?.as_str()?.to_lowercase();
		predicate(&text).then(|| value.to_string())
	})
}

async fn capture_table_or_crop(client: &fantoccini::Client) -> Result<Vec<u8>, FipeError> {
	if let Ok(table) = client.find(Locator::Css("table.tabelaResultado")).await {
		if let Ok(png) = table.screenshot().await {
			return Ok(png);
		}
	}
	let full = client.screenshot().await.map_err(evidence_err)?;
	crop_fallback(&full)
}

fn crop_fallback(png: &[u8]) -> Result<Vec<u8>, FipeError> {
	let img = image::load_from_memory(png).map_err(evidence_err)?;
	let (width, height) = img.dimensions();
	let y_start = CROP_Y_START.min(height.saturating_sub(1));
	let y_end = CROP_Y_END.min(height);
	let crop_height = y_end.saturating_sub(y_start).max(1);

	let cropped = img.crop_imm(0, y_start, width, crop_height);
	let mut out = Vec::new();
	cropped
		.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
		.map_err(evidence_err)?;
	Ok(out)
}
