use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub questions: Vec<String>,
}

/// Ordered topic list offered as starting points for the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionCatalog {
    categories: Vec<Category>,
}

impl SuggestionCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Case-insensitive lookup by category name.
    pub fn find(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Default for SuggestionCatalog {
    fn default() -> Self {
        let category = |name: &str, questions: &[&str]| Category {
            name: name.to_string(),
            questions: questions.iter().map(|q| q.to_string()).collect(),
        };

        Self::new(vec![
            category(
                "Basic",
                &[
                    "What is your educational background?",
                    "How did you get started in software engineering?",
                    "What programming languages do you know?",
                    "What are your strongest technical skills?",
                    "How to contact you?",
                ],
            ),
            category(
                "Work",
                &[
                    "Where are you currently working?",
                    "What companies have you worked for?",
                    "What was your most challenging project?",
                    "What was your Current project?",
                    "What is your leadership experience?",
                ],
            ),
            category(
                "Skills",
                &[
                    "Tell me about your software engineering experience.",
                    "What industries have you worked in?",
                    "What are your most impressive projects?",
                    "Do you have any open source contributions?",
                    "What technologies do you use in your projects?",
                ],
            ),
            category(
                "Hobbies",
                &[
                    "What are your hobbies?",
                    "What do you like to do outside of work?",
                    "What project are you most proud of?",
                    "What are you learning right now?",
                    "Can you share your GitHub?",
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_four_topics_of_five() {
        let catalog = SuggestionCatalog::default();
        let names: Vec<&str> = catalog.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Basic", "Work", "Skills", "Hobbies"]);
        assert!(catalog.categories().iter().all(|c| c.questions.len() == 5));
    }

    #[test]
    fn find_ignores_case() {
        let catalog = SuggestionCatalog::default();
        assert_eq!(catalog.find(" hobbies").unwrap().name, "Hobbies");
        assert!(catalog.find("Travel").is_none());
    }

    #[test]
    fn deserializes_from_toml_array() {
        #[derive(Deserialize)]
        struct Wrapper {
            suggestions: SuggestionCatalog,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
[[suggestions]]
name = "Work"
questions = ["Where are you currently working?"]
"#,
        )
        .unwrap();
        assert_eq!(parsed.suggestions.categories().len(), 1);
        assert_eq!(parsed.suggestions.find("work").unwrap().questions.len(), 1);
    }
}
