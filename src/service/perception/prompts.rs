//! Prompts for image perception

use crate::model::ImageMetadata;

/// Instruction prompt sent with the image to the vision model
pub const PERCEPTION_PROMPT: &str = r#"You are a geolocation analyst. Examine the photograph and extract every clue that could narrow down where it was taken.

## What to extract

1. **OCR text**: every readable text fragment (street names, shop signs, license plates, posters, transit signage). Record the language when recognizable.
2. **Visual features**: landmarks, architecture style, vegetation, road markings, vehicles, utility poles, terrain. One entry per distinct trait.
3. **Scene metadata**: scene type (urban street, rural road, indoor, coastline, ...), time of day, season, weather.

## Output format

Return a single JSON object, no prose, no code fences:

{
  "ocr_texts": [
    {"text": "...", "bbox": [x1, y1, x2, y2], "confidence": 0.0, "language": "en"}
  ],
  "visual_features": [
    {"category": "landmark", "value": "...", "confidence": 0.0}
  ],
  "metadata": {
    "scene_type": "...", "time_of_day": "...", "season": "...", "weather": "...", "notes": "..."
  }
}

Rules:
- Confidence values lie in [0, 1]; omit fields you cannot determine.
- Transcribe text verbatim, do not translate.
- Return empty lists rather than inventing clues."#;

/// Build the full perception prompt, appending EXIF context when available
pub fn build_perception_prompt(exif: &ImageMetadata) -> String {
    let mut context = Vec::new();
    if let Some(gps) = &exif.gps {
        context.push(format!("GPS: ({:.4}, {:.4})", gps.lat, gps.lon));
    }
    if let Some(timestamp) = &exif.timestamp {
        context.push(format!("timestamp: {timestamp}"));
    }
    if let Some(camera) = &exif.camera {
        context.push(format!("camera: {camera}"));
    }

    if context.is_empty() {
        PERCEPTION_PROMPT.to_string()
    } else {
        format!(
            "{PERCEPTION_PROMPT}\n\n## EXIF context\n\n{}",
            context.join("\n")
        )
    }
}
