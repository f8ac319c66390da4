use crate::config::ClassifierSettings;
use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::services::classifier::ImageClassifier;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocess {
    pub crop_size: u32,
    pub crop_pct: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl From<&ClassifierSettings> for Preprocess {
    fn from(settings: &ClassifierSettings) -> Self {
        Self {
            crop_size: settings.crop_size,
            crop_pct: settings.crop_pct,
            mean: settings.mean,
            std: settings.std,
        }
    }
}

pub fn preprocess_image(img: &DynamicImage, params: &Preprocess) -> Result<Array4<f32>, AppError> {
    let crop_size = params.crop_size;

    // Resize shortest edge to ceil(crop_size / crop_pct), then center crop
    let resize_size = (crop_size as f32 / params.crop_pct).ceil() as u32;
    let (w, h) = (img.width().max(1), img.height().max(1));
    let (new_w, new_h) = if w < h {
        (resize_size, ((h as f32 / w as f32) * resize_size as f32).round() as u32)
    } else {
        (((w as f32 / h as f32) * resize_size as f32).round() as u32, resize_size)
    };
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let crop_x = (new_w.saturating_sub(crop_size)) / 2;
    let crop_y = (new_h.saturating_sub(crop_size)) / 2;
    let cropped = resized.crop_imm(crop_x, crop_y, crop_size, crop_size);
    let rgb = cropped.to_rgb8();

    // HWC bytes -> normalized CHW floats
    let hw = (crop_size * crop_size) as usize;
    let mut data = vec![0f32; 3 * hw];
    for (i, pixel) in rgb.into_raw().chunks_exact(3).enumerate() {
        for c in 0..3 {
            data[c * hw + i] = (pixel[c] as f32 / 255.0 - params.mean[c]) / params.std[c];
        }
    }

    Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data).map_err(|e| {
        AppError {
            message: format!("Failed to create tensor: {}", e),
        }
    })
}

/// Softmax over raw logits, then the `top_k` most likely labels.
pub fn top_predictions(logits: &[f32], labels: &[String], top_k: usize) -> Vec<Prediction> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

    let mut indexed: Vec<(usize, f32)> = logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .enumerate()
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(top_k);

    indexed
        .into_iter()
        .map(|(idx, confidence)| Prediction {
            class_name: labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx)),
            confidence,
        })
        .collect()
}

pub fn run_inference(
    model: &mut Session,
    input: Array4<f32>,
    labels: &[String],
    top_k: usize,
) -> Result<Vec<Prediction>, AppError> {
    let input_name = model.inputs()[0].name().to_string();

    let input_tensor = Value::from_array(input).map_err(|e| AppError {
        message: format!("Failed to create tensor value: {}", e),
    })?;

    let outputs = model
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError {
            message: format!("Inference failed: {}", e),
        })?;

    let output_value = outputs.values().next().ok_or_else(|| AppError {
        message: "Model produced no outputs".to_string(),
    })?;

    let (_, data) = output_value.try_extract_tensor::<f32>().map_err(|e| AppError {
        message: format!("Failed to extract output tensor: {}", e),
    })?;

    Ok(top_predictions(data, labels, top_k))
}

/// ONNX Runtime session plus the label table read from the model config.
pub struct OnnxClassifier {
    session: Session,
    labels: Vec<String>,
    preprocess: Preprocess,
    top_k: usize,
}

impl OnnxClassifier {
    pub fn new(session: Session, labels: Vec<String>, settings: &ClassifierSettings) -> Self {
        Self {
            session,
            labels,
            preprocess: Preprocess::from(settings),
            top_k: settings.top_k,
        }
    }
}

impl ImageClassifier for OnnxClassifier {
    fn classify(&mut self, image: &DynamicImage) -> Result<Vec<Prediction>, AppError> {
        let tensor = preprocess_image(image, &self.preprocess)?;
        run_inference(&mut self.session, tensor, &self.labels, self.top_k)
    }
}
