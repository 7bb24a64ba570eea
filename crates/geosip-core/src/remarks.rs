//! Remarks text generation seam.
//!
//! A [`RemarksWriter`] turns form state into a short remarks sentence. The
//! text generator behind it is external; this module owns the prompt and the
//! fallback when the writer fails.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use geosip_types::RecordDraft;

/// Used when the writer fails or returns nothing.
pub const FALLBACK_REMARKS: &str = "Gagal membuat keterangan otomatis. Silakan isi manual.";

#[derive(Debug, Error)]
pub enum RemarksError {
    #[error("remarks writer not configured")]
    NotConfigured,

    #[error("remarks writer failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RemarksWriter: Send + Sync {
    async fn write(&self, draft: &RecordDraft) -> Result<String, RemarksError>;
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() { "-" } else { s }
}

/// The instruction text sent to a writer.
pub fn remarks_prompt(draft: &RecordDraft) -> String {
    let area = if draft.area > 0.0 {
        format!("{} m2", draft.area)
    } else {
        "-".to_string()
    };

    format!(
        "Bertindaklah sebagai asisten administrasi pertanahan profesional.\n\
         Buatkan \"KETERANGAN\" yang ringkas, formal, dan jelas untuk formulir permohonan \
         pengukuran tanah berdasarkan data berikut:\n\
         \n\
         - Nama Pemilik: {owner}\n\
         - Desa: {village}\n\
         - Nomor GU: {gu}\n\
         - Blok: {block}\n\
         - Nomor Bidang: {plot}\n\
         - Luas: {area}\n\
         - Status: {status}\n\
         - No Dokumen: {document}\n\
         \n\
         Keterangan harus mencakup ringkasan status kelengkapan, lokasi desa, dan tujuan \
         pengukuran. Gunakan Bahasa Indonesia yang baku. Maksimal 2 kalimat.",
        owner = or_dash(&draft.owner_name),
        village = or_dash(&draft.village),
        gu = or_dash(&draft.survey_drawing_number),
        block = or_dash(&draft.block),
        plot = or_dash(&draft.plot_number),
        area = area,
        status = draft.status.label(),
        document = or_dash(&draft.document_number),
    )
}

/// Ask `writer` for remarks, falling back to [`FALLBACK_REMARKS`].
pub async fn remarks_or_fallback(writer: &dyn RemarksWriter, draft: &RecordDraft) -> String {
    match writer.write(draft).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => FALLBACK_REMARKS.to_string(),
        Err(e) => {
            warn!(error = %e, "remarks generation failed");
            FALLBACK_REMARKS.to_string()
        }
    }
}

/// Writer used when no generator is configured. Always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemarksWriter;

#[async_trait]
impl RemarksWriter for NoRemarksWriter {
    async fn write(&self, _draft: &RecordDraft) -> Result<String, RemarksError> {
        Err(RemarksError::NotConfigured)
    }
}
