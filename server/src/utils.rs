use shared::PlayerId;

// Generate display names based on player ID
pub fn display_name(id: PlayerId) -> String {
    let colors = ["blue", "red", "green", "purple", "orange", "cyan", "magenta", "yellow"];
    let index = (id.0.max(1) as usize - 1) % colors.len();
    format!("{}{}", colors[index], id)
}
