//! The three fixed IB assessment rubrics.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rubric {
    pub id: i32,
    pub slug: &'static str,
    pub name: &'static str,
    pub criteria: &'static [Criterion],
}

impl Rubric {
    pub fn criterion_names(&self) -> Vec<&'static str> {
        self.criteria.iter().map(|c| c.name).collect()
    }
}

pub const RUBRICS: [Rubric; 3] = [
    Rubric {
        id: 1,
        slug: "extended_essay",
        name: "Extended Essay",
        criteria: &[
            Criterion {
                name: "Focus and Method",
                description: "Clarity of the research question, appropriateness of the topic and the methodology chosen to answer it",
            },
            Criterion {
                name: "Knowledge and Understanding",
                description: "Contextualisation of the research and command of subject-specific terminology and concepts",
            },
            Criterion {
                name: "Critical Thinking",
                description: "Quality of research, analysis, discussion and evaluation leading to a reasoned argument",
            },
            Criterion {
                name: "Presentation",
                description: "Structure, layout, referencing and adherence to the formal requirements of an academic essay",
            },
            Criterion {
                name: "Engagement",
                description: "Evidence of personal engagement, intellectual initiative and reflection on the research process",
            },
        ],
    },
    Rubric {
        id: 2,
        slug: "tok_essay",
        name: "TOK Essay",
        criteria: &[
            Criterion {
                name: "Understanding Knowledge Questions",
                description: "Focus on the prescribed title and the knowledge questions it raises",
            },
            Criterion {
                name: "Quality of Analysis",
                description: "Depth of analysis of knowledge claims, counterclaims and their implications",
            },
            Criterion {
                name: "Use of Examples",
                description: "Relevance and variety of real-life examples supporting the argument",
            },
            Criterion {
                name: "Evaluation of Perspectives",
                description: "Consideration and evaluation of different points of view and areas of knowledge",
            },
            Criterion {
                name: "Organisation and Clarity",
                description: "Coherence of the argument, clarity of expression and overall structure",
            },
        ],
    },
    Rubric {
        id: 3,
        slug: "tok_exhibition",
        name: "TOK Exhibition",
        criteria: &[
            Criterion {
                name: "Identification of Objects",
                description: "Clear identification of three objects and their specific real-world contexts",
            },
            Criterion {
                name: "Links to the IA Prompt",
                description: "Explicit, well-explained links between each object and the selected IA prompt",
            },
            Criterion {
                name: "Justification of Inclusion",
                description: "Strength of the reasons given for including each object in the exhibition",
            },
            Criterion {
                name: "Use of Evidence",
                description: "Appropriate evidence and references supporting the commentary on each object",
            },
            Criterion {
                name: "Overall Coherence",
                description: "How well the exhibition works as a whole to explore the chosen prompt",
            },
        ],
    },
];

pub fn rubric(id: i32) -> Option<&'static Rubric> {
    RUBRICS.iter().find(|r| r.id == id)
}

/// Display name of a rubric id, falling back to a generic label for ids
/// that predate the current catalog.
pub fn rubric_name(id: i32) -> String {
    rubric(id)
        .map(|r| r.name.to_string())
        .unwrap_or_else(|| format!("Rubric {}", id))
}
