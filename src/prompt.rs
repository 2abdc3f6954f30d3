use crate::types::TripType;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

const ITINERARY_TEMPLATE: &str = "Create a continuous {days}-day travel itinerary for {country} by {trip_type}. \
The itinerary must be exactly {days} days, no more and no less.
Ensure that each day's end location is the start location for the next day.
{distance_rule}
Include specific city names, points of interest, total distance, and estimated trip duration for each day.
Format the response with {headings} headings.
Start each day's description with the route, e.g., \"From [Start City] to [End City]\".
On a new line after the route, include the text \"Total Distance: X km\" where X is the total distance in km for that day's route.
On another new line, include the text \"Estimated Duration: Y\" where Y is the estimated trip duration for that day's route.
After the duration, list 3-4 points of interest. Do not use any special characters, numbers or bullet points. \
Just put each point of interest on its own line.";

const IMAGE_TEMPLATE: &str = "A scenic landscape representing a {days}-day trip in {country} by {trip_type}, \
showcasing the beauty and diversity of the country.";

/// Build a prompt string with variable substitution.
///
/// Replaces `{key}` placeholders in the template with the matching value.
/// Unknown placeholders are left as-is.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
///
/// # Example
///
/// ```
/// use trip_pipeline::prompt::render;
///
/// let result = render("Visit {country}, as JSON: {{\"c\": \"{country}\"}}", &[("country", "Peru")]);
/// assert_eq!(result, r#"Visit Peru, as JSON: {"c": "Peru"}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    // Pass 1: protect escaped braces
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Pass 2: substitute placeholders
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    // Pass 3: restore escaped braces
    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered = rendered.replace(ESCAPE_SENTINEL_CLOSE, "}");
    rendered
}

/// `'Day 1:', 'Day 2:', and 'Day 3:'`
fn day_headings(days: u32) -> String {
    let headings: Vec<String> = (1..=days.max(1)).map(|d| format!("'Day {}:'", d)).collect();
    match headings.as_slice() {
        [only] => only.clone(),
        [a, b] => format!("{} and {}", a, b),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
        [] => String::new(),
    }
}

fn distance_rule(trip_type: TripType) -> String {
    let (min, max) = trip_type.distance_bounds();
    match trip_type {
        TripType::Bicycle => format!(
            "This is a bicycle trip: each day's route should not exceed {} km.",
            max
        ),
        TripType::Car => format!(
            "This is a car trip: each day's route should be between {} km and {} km.",
            min, max
        ),
    }
}

/// The text-generation prompt for a `days`-day itinerary.
pub fn itinerary_prompt(country: &str, trip_type: TripType, days: u32) -> String {
    let days_str = days.to_string();
    let rule = distance_rule(trip_type);
    let headings = day_headings(days);
    render(
        ITINERARY_TEMPLATE,
        &[
            ("days", days_str.as_str()),
            ("country", country.trim()),
            ("trip_type", trip_type.as_str()),
            ("distance_rule", rule.as_str()),
            ("headings", headings.as_str()),
        ],
    )
}

/// The image prompt illustrating the whole trip.
pub fn image_prompt(country: &str, trip_type: TripType, days: u32) -> String {
    let days_str = days.to_string();
    render(
        IMAGE_TEMPLATE,
        &[
            ("days", days_str.as_str()),
            ("country", country.trim()),
            ("trip_type", trip_type.as_str()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic() {
        let result = render("Hello {name}, visit {place}", &[("name", "Alice"), ("place", "Oslo")]);
        assert_eq!(result, "Hello Alice, visit Oslo");
    }

    #[test]
    fn test_render_unknown_placeholder_kept() {
        assert_eq!(render("static {missing}", &[]), "static {missing}");
    }

    #[test]
    fn test_render_escaped_braces_no_substitution() {
        let result = render("Output format: {{\"result\": {{\"value\": 42}}}}", &[]);
        assert_eq!(result, r#"Output format: {"result": {"value": 42}}"#);
    }

    #[test]
    fn test_day_headings() {
        assert_eq!(day_headings(1), "'Day 1:'");
        assert_eq!(day_headings(2), "'Day 1:' and 'Day 2:'");
        assert_eq!(day_headings(3), "'Day 1:', 'Day 2:', and 'Day 3:'");
    }

    #[test]
    fn test_itinerary_prompt_car() {
        let prompt = itinerary_prompt("France", TripType::Car, 3);
        assert!(prompt.starts_with("Create a continuous 3-day travel itinerary for France by car."));
        assert!(prompt.contains("between 80 km and 300 km"));
        assert!(prompt.contains("'Day 1:', 'Day 2:', and 'Day 3:'"));
        assert!(prompt.contains("Total Distance: X km"));
        assert!(prompt.contains("Estimated Duration: Y"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_itinerary_prompt_bicycle() {
        let prompt = itinerary_prompt("Netherlands", TripType::Bicycle, 2);
        assert!(prompt.contains("by bicycle"));
        assert!(prompt.contains("should not exceed 80 km"));
        assert!(prompt.contains("exactly 2 days"));
    }

    #[test]
    fn test_image_prompt() {
        assert_eq!(
            image_prompt("Japan", TripType::Bicycle, 3),
            "A scenic landscape representing a 3-day trip in Japan by bicycle, \
             showcasing the beauty and diversity of the country."
        );
    }
}
