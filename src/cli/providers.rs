use console::style;

use crate::core::llm::registry::ProviderRegistry;
use crate::core::terminal::GuideSection;

pub(super) fn run() {
    let registry = ProviderRegistry::load();
    let mut section = GuideSection::new("Providers");
    for def in &registry.providers {
        let credential = if def.has_credential() {
            format!("{}", style("set").green().bold())
        } else {
            format!("{} ({})", style("missing").red().bold(), def.api_key_env)
        };
        section = section.status(
            &def.id,
            &format!("{} · {} · {}", def.name, def.default_model, credential),
        );
    }
    section
        .blank()
        .hint("Override endpoints with CUBEWISE_<PROVIDER>_BASE_URL.")
        .print();
    println!();
}
