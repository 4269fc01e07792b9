use crate::commands::Out;
use crate::config::Settings;
use crate::model::Categories;
use crate::Result;

/// Lists the category vocabulary from `settings`.
pub fn categories(settings: &Settings) -> Result<Out<Categories>> {
    let categories = settings.categories()?;
    let mut message = format!("{} categories:\n", categories.names().len());
    for name in categories.names() {
        message.push_str(&format!("  {name}\n"));
    }
    message.push_str(&format!(
        "Fallback: {} ({})",
        categories.fallback(),
        categories.fallback_confidence()
    ));
    Ok(Out::new(message, categories))
}
