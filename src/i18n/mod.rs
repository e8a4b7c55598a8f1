//! Internationalization (i18n) module.
//!
//! User-facing strings for rendered notices, display headers and CLI output.
//! English is the default language; Spanish is available as an alternative.
//! Strings with a `{}` placeholder are completed with [`fill`].

use std::sync::OnceLock;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Spanish
    Es,
}

impl Lang {
    /// Parse a language code string (e.g. "en", "es", "en_US", "es_ES").
    /// Returns `None` for unrecognized codes.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        match normalized.split(['_', '-', '.']).next().unwrap_or("") {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Initialize the global language. Only the first call has an effect.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Get the currently configured language (defaults to English).
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect language from `MIMEVIEW_LANG`, `LC_MESSAGES` or `LANG`.
pub fn detect_system_lang() -> Lang {
    ["MIMEVIEW_LANG", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| Lang::from_code(&value))
        .unwrap_or(Lang::En)
}

/// Replace the first `{}` of a localized template with `arg`.
pub fn fill(template: &str, arg: &str) -> String {
    template.replacen("{}", arg, 1)
}

macro_rules! msg {
    ($name:ident, $en:expr, $es:expr) => {
        /// Returns a localized string for the current language.
        pub fn $name() -> &'static str {
            match lang() {
                Lang::En => $en,
                Lang::Es => $es,
            }
        }
    };
}

// ── Render notices ───────────────────────────────────────────────

msg!(
    no_inline_text,
    "There is no text that can be displayed inline.",
    "No hay texto que se pueda mostrar en l\u{ed}nea."
);
msg!(
    no_inline_representation,
    "No inline representation is available for this part ({}).",
    "No hay representaci\u{f3}n en l\u{ed}nea para esta parte ({})."
);
msg!(unnamed, "unnamed", "sin nombre");
msg!(here, "HERE", "AQU\u{cd}");
msg!(macintosh_file, "Macintosh File", "Fichero de Macintosh");
msg!(
    mac_contains_file,
    "This message contains a Macintosh file (named \"{}\").",
    "Este mensaje contiene un fichero de Macintosh (llamado \"{}\")."
);
msg!(
    mac_resource_fork_download,
    "The Macintosh resource fork can be downloaded {}.",
    "La bifurcaci\u{f3}n de recursos de Macintosh se puede descargar {}."
);
msg!(
    mac_contents_below,
    "The contents of the Macintosh file are below.",
    "El contenido del fichero de Macintosh se muestra a continuaci\u{f3}n."
);
msg!(
    mac_contents_download,
    "The contents of the Macintosh file can be downloaded {}.",
    "El contenido del fichero de Macintosh se puede descargar {}."
);
msg!(
    mac_unreadable,
    "This Macintosh file could not be read: its data part is missing.",
    "No se pudo leer este fichero de Macintosh: falta su parte de datos."
);
msg!(
    images_blocked,
    "Images have been blocked in this message.",
    "Se han bloqueado las im\u{e1}genes de este mensaje."
);
msg!(show_images, "Show images", "Mostrar im\u{e1}genes");
msg!(attachment, "Attachment", "Adjunto");
msg!(
    attached_message,
    "Attached message: {}",
    "Mensaje adjunto: {}"
);
msg!(download, "Download", "Descargar");

// ── Display headers ──────────────────────────────────────────────

msg!(hdr_date, "Date", "Fecha");
msg!(hdr_from, "From", "De");
msg!(hdr_to, "To", "Para");
msg!(hdr_cc, "Cc", "Cc");
msg!(hdr_bcc, "Bcc", "Cco");
msg!(hdr_reply_to, "Reply-To", "Responder a");
msg!(hdr_subject, "Subject", "Asunto");
msg!(
    undisclosed_recipients,
    "Undisclosed Recipients",
    "Destinatarios no revelados"
);
msg!(
    show_addresses,
    "[Show Addresses - {} recipients]",
    "[Mostrar direcciones - {} destinatarios]"
);
msg!(hide_addresses, "[Hide Addresses]", "[Ocultar direcciones]");
msg!(today_at, "Today, {}", "Hoy, {}");
msg!(
    mailing_list_message,
    "Mailing List Message",
    "Mensaje de lista de correo"
);
msg!(priority_high, "high", "alta");
msg!(priority_normal, "normal", "normal");
msg!(priority_low, "low", "baja");

// ── Views ────────────────────────────────────────────────────────

msg!(thread_view, "Thread View", "Vista de conversaci\u{f3}n");
msg!(
    multiple_message_view,
    "Multiple Message View",
    "Vista de varios mensajes"
);
msg!(n_messages, "{} Messages", "{} mensajes");
msg!(thread_list, "Thread List", "Lista de la conversaci\u{f3}n");
msg!(
    back_to_index,
    "Back to Multiple Message View Index",
    "Volver al \u{ed}ndice de varios mensajes"
);
msg!(
    could_not_load_message,
    "Could not load message.",
    "No se pudo cargar el mensaje."
);

// ── CLI ──────────────────────────────────────────────────────────

msg!(
    app_about,
    "mimeview \u{2014} render stored email messages and threads for display.",
    "mimeview \u{2014} muestra mensajes y conversaciones de correo almacenados."
);
msg!(
    help_cmd_thread,
    "Show the whole thread containing a message",
    "Mostrar la conversaci\u{f3}n completa de un mensaje"
);
msg!(
    help_cmd_view,
    "Show several messages together",
    "Mostrar varios mensajes juntos"
);
msg!(
    help_cmd_parts,
    "Print the resolved part map of a message",
    "Imprimir el mapa de partes resuelto de un mensaje"
);
msg!(
    help_cmd_completions,
    "Generate shell completions",
    "Generar autocompletado para la shell"
);
msg!(help_cmd_manpage, "Generate a man page", "Generar p\u{e1}gina de manual");
msg!(
    err_file_not_found,
    "File not found",
    "Fichero no encontrado"
);
msg!(msg_scanning, "Scanning mailbox", "Leyendo buz\u{f3}n");
msg!(
    cli_partial_failures,
    "Messages that could not be displayed",
    "Mensajes que no se pudieron mostrar"
);
msg!(suppressed, "suppressed", "suprimida");
