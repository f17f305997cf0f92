use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Minimum plausible byte length of a glTF JSON document.
const MIN_DOCUMENT_LEN: usize = 10;

/// Isolated renderer capable of loading a glTF scene and returning a raster
/// JPEG. Implementations own their sandbox lifecycle; callers only see the
/// per-render contract.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Render the scene to JPEG bytes at the requested dimensions.
    async fn render(
        &self,
        gltf_json: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, PipelineError>;

    /// Check if the renderer is available/healthy
    async fn health_check(&self) -> bool;

    /// Tear down long-lived sandbox resources. Default: nothing to do.
    async fn shutdown(&self) {}
}

fn check_render_input(gltf_json: &str, width: u32, height: u32) -> Result<(), PipelineError> {
    if gltf_json.len() < MIN_DOCUMENT_LEN {
        return Err(PipelineError::RenderFailed(
            "input is not a plausible glTF JSON string".to_string(),
        ));
    }
    if width == 0 || height == 0 {
        return Err(PipelineError::RenderFailed(format!(
            "invalid render size {width}x{height}"
        )));
    }
    Ok(())
}

/// Headless-Chromium renderer.
///
/// The browser process is a process-wide singleton, lazily launched on first
/// use and reused across jobs; each render gets a short-lived page that is
/// closed on every path. Only page acquisition touches the singleton.
pub struct ChromiumRenderer {
    browser: OnceCell<Mutex<Browser>>,
    timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            browser: OnceCell::new(),
            timeout,
        }
    }

    async fn browser(&self) -> Result<&Mutex<Browser>, PipelineError> {
        self.browser
            .get_or_try_init(|| async {
                let config = BrowserConfig::builder()
                    .no_sandbox()
                    .window_size(1024, 1024)
                    .arg("--disable-dev-shm-usage")
                    .arg("--enable-webgl")
                    .arg("--ignore-gpu-blocklist")
                    .build()
                    .map_err(PipelineError::RenderFailed)?;

                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| PipelineError::RenderFailed(format!("browser launch: {e}")))?;

                // Drive the CDP event loop for the lifetime of the browser.
                tokio::spawn(async move { while handler.next().await.is_some() {} });

                tracing::info!("headless browser launched");
                Ok(Mutex::new(browser))
            })
            .await
    }

    async fn new_page(&self) -> Result<Page, PipelineError> {
        let browser = self.browser().await?;
        let guard = browser.lock().await;
        guard
            .new_page("about:blank")
            .await
            .map_err(|e| PipelineError::RenderFailed(format!("new page: {e}")))
    }

    async fn drive(page: &Page, gltf_json: &str, width: u32, height: u32) -> Result<Vec<u8>, PipelineError> {
        let render_err = |e: chromiumoxide::error::CdpError| {
            PipelineError::RenderFailed(e.to_string())
        };

        page.set_content(
            r#"<html><head><meta charset="utf-8"></head>
               <body style="margin:0;background:#fff"><div id="app"></div></body></html>"#,
        )
        .await
        .map_err(render_err)?;

        let script = build_render_script(gltf_json, width, height)?;
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(PipelineError::RenderFailed)?;
        let eval = page.evaluate(params).await.map_err(render_err)?;
        let ok = eval.value().and_then(|v| v.as_bool()).unwrap_or(false);
        if !ok {
            return Err(PipelineError::RenderFailed(
                "in-page renderer did not report success".to_string(),
            ));
        }

        let shot = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(80)
            .clip(Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f64,
                height: height as f64,
                scale: 1.0,
            })
            .build();
        page.screenshot(shot).await.map_err(render_err)
    }
}

#[async_trait]
impl SceneRenderer for ChromiumRenderer {
    async fn render(
        &self,
        gltf_json: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, PipelineError> {
        check_render_input(gltf_json, width, height)?;

        let page = self.new_page().await?;
        let driven =
            tokio::time::timeout(self.timeout, Self::drive(&page, gltf_json, width, height)).await;

        // The page is torn down whatever the outcome; the browser survives.
        if let Err(e) = page.close().await {
            tracing::warn!("failed to close render page: {}", e);
        }

        match driven {
            Ok(result) => result,
            Err(_) => Err(PipelineError::RenderFailed(format!(
                "render timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn health_check(&self) -> bool {
        match self.browser().await {
            Ok(browser) => browser.lock().await.version().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn shutdown(&self) {
        if let Some(browser) = self.browser.get() {
            let mut guard = browser.lock().await;
            if let Err(e) = guard.close().await {
                tracing::warn!("browser close failed: {}", e);
            }
            let _ = guard.wait().await;
            tracing::info!("headless browser shut down");
        }
    }
}

/// Self-contained in-page render program: load three.js, parse the glTF,
/// frame the scene bounding box and draw once into a WebGL canvas.
fn build_render_script(
    gltf_json: &str,
    width: u32,
    height: u32,
) -> Result<String, PipelineError> {
    // Embed the document as a JS string literal; JSON escaping is valid JS.
    let literal = serde_json::to_string(gltf_json)
        .map_err(|e| PipelineError::RenderFailed(format!("script embed: {e}")))?;

    Ok(format!(
        r#"(async () => {{
  const THREE = await import('https://esm.sh/three@0.158.0');
  const {{ GLTFLoader }} = await import('https://esm.sh/three@0.158.0/examples/jsm/loaders/GLTFLoader.js');
  const jsonStr = {literal};
  const W = {width}, H = {height};

  const canvas = document.createElement('canvas');
  document.getElementById('app').appendChild(canvas);
  const renderer = new THREE.WebGLRenderer({{
    canvas, alpha: false, antialias: true, depth: true, stencil: false, preserveDrawingBuffer: true
  }});
  renderer.setSize(W, H);
  renderer.setPixelRatio(1);
  renderer.setClearColor('#ffffff', 1);

  const scene = new THREE.Scene();
  const camera = new THREE.PerspectiveCamera(45, W / H, 0.01, 10000);
  scene.add(new THREE.AmbientLight(0xffffff, 0.9));
  const dir = new THREE.DirectionalLight(0xffffff, 0.9);
  dir.position.set(1, 1, 1);
  scene.add(dir);

  const loader = new GLTFLoader();
  const gltf = await new Promise((resolve, reject) => {{
    try {{ loader.parse(jsonStr, '', resolve, reject); }} catch (e) {{ reject(e); }}
  }});
  const root = gltf.scene || (gltf.scenes && gltf.scenes[0]);
  if (!root) throw new Error('GLTF_NO_SCENE');
  scene.add(root);

  const box = new THREE.Box3().setFromObject(root);
  const size = box.getSize(new THREE.Vector3());
  const center = box.getCenter(new THREE.Vector3());
  if (!isFinite(size.x + size.y + size.z)) throw new Error('GLTF_EMPTY_GEOMETRY');
  root.position.sub(center);

  const fov = camera.fov * (Math.PI / 180);
  const maxDim = Math.max(size.x, size.y, size.z);
  const dist = (maxDim / 2 / Math.tan(fov / 2)) * 0.9;
  camera.position.set(dist, dist, dist);
  camera.lookAt(0, 0, 0);

  renderer.render(scene, camera);
  return true;
}})()"#
    ))
}

/// Browserless renderer for development and tests: emits a solid-background
/// JPEG at the requested dimensions.
pub struct StubRenderer;

#[async_trait]
impl SceneRenderer for StubRenderer {
    async fn render(
        &self,
        gltf_json: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, PipelineError> {
        check_render_input(gltf_json, width, height)?;
        tracing::warn!("StubRenderer: emitting placeholder thumbnail (development mode)");

        let img = image::RgbImage::from_pixel(width, height, image::Rgb([240, 240, 240]));
        let mut out = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut out);
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Jpeg)
            .map_err(|e| PipelineError::RenderFailed(format!("jpeg encode: {e}")))?;
        Ok(out)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Renderer that always fails (for testing retry behavior)
#[cfg(test)]
pub struct AlwaysFailingRenderer;

#[cfg(test)]
#[async_trait]
impl SceneRenderer for AlwaysFailingRenderer {
    async fn render(&self, _: &str, _: u32, _: u32) -> Result<Vec<u8>, PipelineError> {
        Err(PipelineError::RenderFailed("synthetic failure".to_string()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Factory function to create the appropriate renderer based on config
pub fn create_renderer(config: &PipelineConfig) -> std::sync::Arc<dyn SceneRenderer> {
    let timeout = Duration::from_secs(config.render_timeout_secs);
    match config.renderer_type.to_lowercase().as_str() {
        "chromium" => std::sync::Arc::new(ChromiumRenderer::new(timeout)),
        "stub" | "none" | "disabled" => std::sync::Arc::new(StubRenderer),
        other => {
            tracing::warn!("Unknown renderer type '{}', using StubRenderer", other);
            std::sync::Arc::new(StubRenderer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{"asset":{"version":"2.0"},"scenes":[]}"#;

    #[tokio::test]
    async fn test_stub_renderer_emits_decodable_jpeg() {
        let jpeg = StubRenderer.render(MINIMAL, 64, 32).await.unwrap();
        let img = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(img.width(), 64);
        assert_eq!(img.height(), 32);
        assert!(StubRenderer.health_check().await);
    }

    #[tokio::test]
    async fn test_render_input_validation() {
        let err = StubRenderer.render("{}", 64, 64).await.unwrap_err();
        assert_eq!(err.code(), "RENDER_FAILED");

        let err = StubRenderer.render(MINIMAL, 0, 64).await.unwrap_err();
        assert_eq!(err.code(), "RENDER_FAILED");
    }

    #[test]
    fn test_render_script_embeds_document_safely() {
        let script = build_render_script(r#"{"asset":{"version":"2.0"}}"#, 200, 100).unwrap();
        assert!(script.contains(r#"const jsonStr = "{\"asset\":{\"version\":\"2.0\"}}";"#));
        assert!(script.contains("const W = 200, H = 100;"));
    }

    #[tokio::test]
    async fn test_create_renderer_falls_back_to_stub() {
        let mut config = PipelineConfig::default();
        config.renderer_type = "something-else".to_string();
        let renderer = create_renderer(&config);
        assert!(renderer.health_check().await);
    }
}
