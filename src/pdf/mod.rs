// Certificate PDF generation
// Default mode draws the whole certificate; template mode overlays the
// dynamic fields on the first page of an uploaded background.
mod canvas;
mod fonts;
mod template;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use lopdf::{dictionary, Document, Object, Stream};
use std::time::Duration;

use crate::error::RenderError;
use crate::storage::TemplateConfig;
use canvas::{Canvas, BLACK, GOLD, GRAY};
use fonts::{Face, ALL_FACES};
use template::LoadedTemplate;

/// Landscape A4 in points.
const DEFAULT_PAGE: (f32, f32) = (841.89, 595.28);

const DEFAULT_NAME_SIZE: f32 = 48.0;
const OVERLAY_NAME_SIZE: f32 = 26.0;
const OVERLAY_NAME_Y: f32 = 0.34;
const OVERLAY_FOOTER_Y: f32 = 0.28;
const DEFAULT_FOOTER_Y: f32 = 80.0;
const FOOTER_INSET: f32 = 100.0;
const FOOTER_SIZE: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct CertificateData {
    pub name: String,
    pub event_name: String,
    pub certificate_id: String,
}

/// `October 18, 2026`
pub fn format_issue_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Render one certificate. Uses template mode when `config` carries a
/// background, default mode otherwise.
pub fn render_certificate(
    data: &CertificateData,
    config: &TemplateConfig,
    issued_on: NaiveDate,
) -> Result<Vec<u8>, RenderError> {
    let issue_date = format_issue_date(issued_on);
    match &config.background {
        Some(background) => render_on_template(data, config, background, &issue_date),
        None => render_default(data, &issue_date),
    }
}

fn render_on_template(
    data: &CertificateData,
    config: &TemplateConfig,
    background: &[u8],
    issue_date: &str,
) -> Result<Vec<u8>, RenderError> {
    let template = LoadedTemplate::load(background)?;
    let mut canvas = template.canvas();
    let placement = config.placement;

    let size = placement.name_size.unwrap_or(OVERLAY_NAME_SIZE);
    let y = placement
        .name_y
        .unwrap_or(canvas.height * OVERLAY_NAME_Y);
    match placement.name_x {
        Some(x) => canvas.text(&data.name, x, y, Face::Bold, size, BLACK),
        None => canvas.centered_text(&data.name, y, Face::Bold, size, BLACK),
    }

    let footer_y = canvas.height * OVERLAY_FOOTER_Y;
    draw_footer(&mut canvas, footer_y, issue_date, &data.certificate_id);

    template.finish(canvas)
}

fn render_default(data: &CertificateData, issue_date: &str) -> Result<Vec<u8>, RenderError> {
    let (width, height) = DEFAULT_PAGE;
    let mut canvas = Canvas::new(width, height);

    canvas.stroke_rect(20.0, 20.0, width - 40.0, height - 40.0, 5.0, GOLD);
    canvas.stroke_rect(40.0, 40.0, width - 80.0, height - 80.0, 1.0, GOLD);

    canvas.centered_text("CERTIFICATE OF PARTICIPATION", height - 150.0, Face::Bold, 36.0, BLACK);
    canvas.centered_text("This is to certify that", height - 220.0, Face::Italic, 16.0, GRAY);
    canvas.centered_text(&data.name, height - 300.0, Face::Bold, DEFAULT_NAME_SIZE, BLACK);
    canvas.centered_text(
        "has successfully participated in the event",
        height - 350.0,
        Face::Regular,
        16.0,
        GRAY,
    );
    canvas.centered_text(&data.event_name, height - 400.0, Face::Bold, 24.0, BLACK);

    draw_footer(&mut canvas, DEFAULT_FOOTER_Y, issue_date, &data.certificate_id);

    single_page_document(canvas)
}

fn draw_footer(canvas: &mut Canvas, y: f32, issue_date: &str, certificate_id: &str) {
    canvas.text(
        &format!("Date: {issue_date}"),
        FOOTER_INSET,
        y,
        Face::Regular,
        FOOTER_SIZE,
        GRAY,
    );
    let right = canvas.width - FOOTER_INSET;
    canvas.right_aligned_text(
        &format!("Certificate ID: {certificate_id}"),
        right,
        y,
        Face::Regular,
        FOOTER_SIZE,
        GRAY,
    );
}

fn single_page_document(canvas: Canvas) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (canvas.width, canvas.height);
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font_dict = lopdf::Dictionary::new();
    for face in ALL_FACES {
        let font_id = doc.add_object(face.dictionary());
        font_dict.set(face.resource_name(), font_id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => font_dict });

    let content = canvas.into_content()?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let media_box: Vec<Object> = vec![0.into(), 0.into(), width.into(), height.into()];
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => media_box,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Creator", Object::string_literal("certifier"));

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Save(e.to_string()))?;
    Ok(out)
}

/// Produces certificate bytes for one participant.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        data: CertificateData,
        config: TemplateConfig,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Renders certificates off the async runtime with a per-call time limit.
#[derive(Debug, Clone)]
pub struct CertificateRenderer {
    timeout: Duration,
}

impl CertificateRenderer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Renderer for CertificateRenderer {
    async fn render(
        &self,
        data: CertificateData,
        config: TemplateConfig,
    ) -> Result<Vec<u8>, RenderError> {
        let issued_on = Local::now().date_naive();
        run_bounded(self.timeout, move || {
            render_certificate(&data, &config, issued_on)
        })
        .await
    }
}

/// Run a blocking render job on the blocking pool, giving up after `limit`.
/// A job that outlives the limit keeps its thread until it finishes.
pub(crate) async fn run_bounded<F>(limit: Duration, job: F) -> Result<Vec<u8>, RenderError>
where
    F: FnOnce() -> Result<Vec<u8>, RenderError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(job);
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(RenderError::Aborted(join_err.to_string())),
        Err(_) => Err(RenderError::Timeout(limit.as_secs())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::NamePlacement;
    use lopdf::content::Content;
    use std::sync::Arc;

    pub(crate) fn sample() -> CertificateData {
        CertificateData {
            name: "Ada Lovelace".into(),
            event_name: "Analytical Engines 2026".into(),
            certificate_id: "0A1B2C3D4E5F".into(),
        }
    }

    fn issued() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 8).unwrap()
    }

    /// A blank one-page portrait PDF used as an uploaded background.
    pub(crate) fn blank_template() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"0.9 g\n".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn zero_page_template() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn with_background(bytes: Vec<u8>) -> TemplateConfig {
        TemplateConfig {
            background: Some(Arc::new(bytes)),
            placement: NamePlacement::default(),
        }
    }

    /// Page size plus every operation on the first page.
    fn first_page(pdf: &[u8]) -> (Document, Vec<lopdf::content::Operation>) {
        let doc = Document::load_mem(pdf).expect("output should parse");
        let page_id = *doc.get_pages().values().next().expect("one page");
        let raw = doc.get_page_content(page_id).unwrap();
        let ops = Content::decode(&raw).unwrap().operations;
        (doc, ops)
    }

    fn real(obj: &Object) -> f32 {
        match obj {
            Object::Real(v) => *v as f32,
            Object::Integer(v) => *v as f32,
            _ => panic!("expected a number"),
        }
    }

    fn shown_text(ops: &[lopdf::content::Operation]) -> Vec<String> {
        ops.iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn issue_date_is_long_form() {
        assert_eq!(format_issue_date(issued()), "October 8, 2026");
    }

    #[test]
    fn default_mode_draws_full_certificate() {
        let pdf = render_certificate(&sample(), &TemplateConfig::default(), issued()).unwrap();
        let (_, ops) = first_page(&pdf);
        let text = shown_text(&ops);

        assert!(text.contains(&"CERTIFICATE OF PARTICIPATION".to_string()));
        assert!(text.contains(&"This is to certify that".to_string()));
        assert!(text.contains(&"Ada Lovelace".to_string()));
        assert!(text.contains(&"Analytical Engines 2026".to_string()));
        assert!(text.contains(&"Date: October 8, 2026".to_string()));
        assert!(text.contains(&"Certificate ID: 0A1B2C3D4E5F".to_string()));
        assert_eq!(ops.iter().filter(|op| op.operator == "re").count(), 2);
    }

    #[test]
    fn template_mode_draws_only_dynamic_fields() {
        let config = with_background(blank_template());
        let pdf = render_certificate(&sample(), &config, issued()).unwrap();
        let (_, ops) = first_page(&pdf);
        let text = shown_text(&ops);

        assert!(text.contains(&"Ada Lovelace".to_string()));
        assert!(text.contains(&"Certificate ID: 0A1B2C3D4E5F".to_string()));
        assert!(!text.contains(&"CERTIFICATE OF PARTICIPATION".to_string()));
        assert!(!text.iter().any(|t| t.contains("certify")));
        assert_eq!(ops.iter().filter(|op| op.operator == "re").count(), 0);
        // Background content survives underneath.
        assert!(ops.iter().any(|op| op.operator == "g"));
    }

    #[test]
    fn template_mode_uses_template_page_size() {
        let config = with_background(blank_template());
        let pdf = render_certificate(&sample(), &config, issued()).unwrap();
        let (_, ops) = first_page(&pdf);

        // Footer sits at 28% of the 842pt portrait height.
        let footer_y = ops
            .iter()
            .filter(|op| op.operator == "Td")
            .filter_map(|op| op.operands.get(1).map(real))
            .fold(f32::MAX, f32::min);
        assert!((footer_y - 842.0 * 0.28).abs() < 0.01);
    }

    #[test]
    fn explicit_placement_is_honoured() {
        let mut config = with_background(blank_template());
        config.placement = NamePlacement {
            name_x: Some(72.0),
            name_y: Some(400.0),
            name_size: Some(30.0),
        };
        let pdf = render_certificate(&sample(), &config, issued()).unwrap();
        let (_, ops) = first_page(&pdf);

        let tj_index = ops
            .iter()
            .position(|op| {
                op.operator == "Tj"
                    && matches!(op.operands.first(), Some(Object::String(b, _)) if b.as_slice() == b"Ada Lovelace")
            })
            .unwrap();
        let td = &ops[tj_index - 1];
        let tf = &ops[tj_index - 2];
        assert_eq!(real(&td.operands[0]), 72.0);
        assert_eq!(real(&td.operands[1]), 400.0);
        assert_eq!(real(&tf.operands[1]), 30.0);
    }

    #[test]
    fn corrupt_template_is_a_render_error() {
        let config = with_background(b"%PDF-1.4 this is not really a pdf".to_vec());
        let err = render_certificate(&sample(), &config, issued()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Template(_) | RenderError::EmptyTemplate
        ));
    }

    #[test]
    fn zero_page_template_is_a_render_error() {
        let config = with_background(zero_page_template());
        let err = render_certificate(&sample(), &config, issued()).unwrap_err();
        assert!(matches!(err, RenderError::EmptyTemplate));
    }

    #[tokio::test]
    async fn renderer_runs_off_runtime() {
        let renderer = CertificateRenderer::new(Duration::from_secs(10));
        let pdf = renderer
            .render(sample(), TemplateConfig::default())
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let err = run_bounded(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Vec::new())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RenderError::Timeout(0)));
    }

    #[tokio::test]
    async fn zero_timeout_renderer_gives_up() {
        let renderer = CertificateRenderer::new(Duration::ZERO);
        let err = renderer
            .render(sample(), TemplateConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Timeout(0)));
    }

    #[tokio::test]
    async fn panicking_job_is_aborted() {
        let err = run_bounded(Duration::from_secs(5), || panic!("font table missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Aborted(_)));
    }
}
