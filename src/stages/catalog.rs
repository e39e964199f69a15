//! Static domain and task catalog backing experience generation.
//!
//! Four supported domains, each with three tasks, persona pools and scenario
//! templates. The experience writer samples from these pools with a seeded
//! RNG; unknown domain/task combinations are rejected so the executor can
//! fall back.

use super::types::Persona;

/// A persona template resolved into a [`Persona`] at sampling time.
#[derive(Debug, Clone, Copy)]
pub struct PersonaTemplate {
    pub name: &'static str,
    pub role: &'static str,
    pub traits: &'static [&'static str],
    pub background: &'static str,
}

impl PersonaTemplate {
    /// Materializes the template into an owned persona.
    pub fn to_persona(&self) -> Persona {
        Persona::new(self.name, self.role)
            .with_traits(self.traits)
            .with_background(self.background)
    }
}

/// A situation/goal/starter triple for one task.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioTemplate {
    pub situation: &'static str,
    pub goal: &'static str,
    pub starter: &'static str,
    pub style: &'static str,
}

/// One task within a domain.
#[derive(Debug, Clone, Copy)]
pub struct TaskProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub scenarios: &'static [ScenarioTemplate],
}

/// One supported domain with its persona pools and tasks.
#[derive(Debug, Clone, Copy)]
pub struct DomainProfile {
    pub id: &'static str,
    pub name: &'static str,
    /// Personas that lead the dialogue (doctor, agent, tutor, consultant).
    pub leads: &'static [PersonaTemplate],
    /// Personas that open the dialogue (patient, customer, student, client).
    pub respondents: &'static [PersonaTemplate],
    pub tasks: &'static [TaskProfile],
}

impl DomainProfile {
    /// Looks up a task by id within this domain.
    pub fn task(&self, id: &str) -> Option<&TaskProfile> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Looks up a domain profile by id.
pub fn domain(id: &str) -> Option<&'static DomainProfile> {
    DOMAINS.iter().find(|d| d.id == id)
}

/// Coarse category label used in dataset item metadata.
pub fn domain_category(domain_id: &str) -> &'static str {
    match domain_id {
        "healthcare" => "clinical_diagnosis",
        "customer_support" => "service_resolution",
        "education" => "tutoring_session",
        "business" => "professional_consultation",
        _ => "general_dialogue",
    }
}

pub const DOMAINS: &[DomainProfile] = &[
    DomainProfile {
        id: "healthcare",
        name: "Healthcare",
        leads: &[
            PersonaTemplate {
                name: "Dr. Sarah Chen",
                role: "doctor",
                traits: &["calm", "analytical", "empathetic"],
                background: "Experienced family physician with 15 years of practice",
            },
            PersonaTemplate {
                name: "Dr. Marcus Webb",
                role: "doctor",
                traits: &["direct", "thorough", "reassuring"],
                background: "Internal medicine specialist focused on preventive care",
            },
        ],
        respondents: &[
            PersonaTemplate {
                name: "Alex Rodriguez",
                role: "patient",
                traits: &["worried", "cooperative", "detailed"],
                background: "Software engineer experiencing fever symptoms",
            },
            PersonaTemplate {
                name: "Priya Nair",
                role: "patient",
                traits: &["anxious", "inquisitive", "precise"],
                background: "Teacher managing a recurring respiratory condition",
            },
        ],
        tasks: &[
            TaskProfile {
                id: "diagnose_fever",
                name: "Diagnose Fever",
                scenarios: &[
                    ScenarioTemplate {
                        situation: "Patient reports fever and cough symptoms for 3 days",
                        goal: "Doctor identifies likely cause and recommends appropriate tests or treatment",
                        starter: "I've had a fever for three days and it's not improving. I also have a persistent cough.",
                        style: "concise and clear",
                    },
                    ScenarioTemplate {
                        situation: "Patient woke with chills and a temperature of 38.9C after recent travel",
                        goal: "Doctor rules out serious infection and sets a monitoring plan",
                        starter: "I got back from a trip two days ago and now I have chills and a high temperature.",
                        style: "calm and methodical",
                    },
                ],
            },
            TaskProfile {
                id: "symptom_check",
                name: "Symptom Assessment",
                scenarios: &[ScenarioTemplate {
                    situation: "Patient describes intermittent chest tightness during exercise",
                    goal: "Doctor triages urgency and decides whether in-person evaluation is needed",
                    starter: "Lately my chest feels tight when I jog. Should I be concerned?",
                    style: "thorough and reassuring",
                }],
            },
            TaskProfile {
                id: "medication_advice",
                name: "Medication Consultation",
                scenarios: &[ScenarioTemplate {
                    situation: "Patient is unsure whether to combine an antihistamine with existing blood pressure medication",
                    goal: "Doctor confirms safe usage and flags interactions to avoid",
                    starter: "Can I take allergy medicine together with my blood pressure pills?",
                    style: "precise and cautious",
                }],
            },
        ],
    },
    DomainProfile {
        id: "customer_support",
        name: "Customer Support",
        leads: &[
            PersonaTemplate {
                name: "Jennifer Walsh",
                role: "customer_service_agent",
                traits: &["patient", "solution-oriented", "professional"],
                background: "Senior customer service representative with expertise in returns",
            },
            PersonaTemplate {
                name: "Omar Haddad",
                role: "customer_service_agent",
                traits: &["friendly", "efficient", "detail-oriented"],
                background: "Support lead specializing in billing and account issues",
            },
        ],
        respondents: &[
            PersonaTemplate {
                name: "Michael Thompson",
                role: "customer",
                traits: &["frustrated", "determined", "polite"],
                background: "Recent online shopper seeking refund for defective product",
            },
            PersonaTemplate {
                name: "Dana Kovac",
                role: "customer",
                traits: &["rushed", "direct", "reasonable"],
                background: "Frequent traveler with a double-charged booking",
            },
        ],
        tasks: &[
            TaskProfile {
                id: "refund_request",
                name: "Refund Request",
                scenarios: &[ScenarioTemplate {
                    situation: "Customer received a defective electronic device and wants a refund",
                    goal: "Agent processes refund and maintains customer satisfaction",
                    starter: "I received my order yesterday, but the device isn't working properly. I'd like to return it for a refund.",
                    style: "helpful and efficient",
                }],
            },
            TaskProfile {
                id: "technical_support",
                name: "Technical Support",
                scenarios: &[ScenarioTemplate {
                    situation: "Customer's smart thermostat keeps disconnecting from the app",
                    goal: "Agent walks through troubleshooting and restores the connection",
                    starter: "My thermostat drops off the app every few hours. I've already restarted it twice.",
                    style: "step-by-step and patient",
                }],
            },
            TaskProfile {
                id: "booking_issue",
                name: "Booking Problem",
                scenarios: &[ScenarioTemplate {
                    situation: "Customer was charged twice for the same hotel reservation",
                    goal: "Agent reverses the duplicate charge and confirms the booking stands",
                    starter: "I just noticed two identical charges for my reservation next week. Only one should be there.",
                    style: "apologetic and decisive",
                }],
            },
        ],
    },
    DomainProfile {
        id: "education",
        name: "Education",
        leads: &[PersonaTemplate {
            name: "Ms. Elena Torres",
            role: "tutor",
            traits: &["encouraging", "patient", "structured"],
            background: "Math tutor who favors worked examples over lectures",
        }],
        respondents: &[PersonaTemplate {
            name: "Jamie Park",
            role: "student",
            traits: &["curious", "easily discouraged", "hard-working"],
            background: "High-school student preparing for an algebra exam",
        }],
        tasks: &[
            TaskProfile {
                id: "math_tutoring",
                name: "Math Tutoring",
                scenarios: &[ScenarioTemplate {
                    situation: "Student keeps losing signs when solving linear equations",
                    goal: "Tutor diagnoses the error pattern and the student solves one correctly unaided",
                    starter: "I always get these equations wrong somewhere in the middle and I don't know why.",
                    style: "encouraging and incremental",
                }],
            },
            TaskProfile {
                id: "concept_explanation",
                name: "Concept Explanation",
                scenarios: &[ScenarioTemplate {
                    situation: "Student is confused about why dividing by a fraction means multiplying by its reciprocal",
                    goal: "Tutor builds intuition with a concrete example the student can restate",
                    starter: "Why does dividing by a half make numbers bigger? That seems backwards.",
                    style: "intuitive with concrete examples",
                }],
            },
            TaskProfile {
                id: "homework_help",
                name: "Homework Assistance",
                scenarios: &[ScenarioTemplate {
                    situation: "Student is stuck on a word problem about rates and needs guidance without being given the answer",
                    goal: "Tutor guides the student to set up the equation themselves",
                    starter: "I've read this word problem four times and I can't even start it.",
                    style: "socratic and supportive",
                }],
            },
        ],
    },
    DomainProfile {
        id: "business",
        name: "Business",
        leads: &[PersonaTemplate {
            name: "Victor Alvarez",
            role: "consultant",
            traits: &["strategic", "candid", "pragmatic"],
            background: "Management consultant advising mid-size software vendors",
        }],
        respondents: &[PersonaTemplate {
            name: "Ingrid Sol",
            role: "client",
            traits: &["ambitious", "skeptical", "data-driven"],
            background: "Operations director evaluating a vendor contract renewal",
        }],
        tasks: &[
            TaskProfile {
                id: "negotiation",
                name: "Contract Negotiation",
                scenarios: &[ScenarioTemplate {
                    situation: "Client wants a 15% discount on renewal; vendor terms allow at most 8% without added commitment",
                    goal: "Parties agree on terms both sides can accept",
                    starter: "Before we renew, I need to talk about the pricing. The current rate doesn't work for us anymore.",
                    style: "firm but collaborative",
                }],
            },
            TaskProfile {
                id: "project_planning",
                name: "Project Planning",
                scenarios: &[ScenarioTemplate {
                    situation: "Client needs a migration plan that avoids downtime during their busy season",
                    goal: "Consultant and client agree on a phased schedule with clear owners",
                    starter: "We have to migrate before Q4, but we can't afford any downtime in September.",
                    style: "structured and risk-aware",
                }],
            },
            TaskProfile {
                id: "client_meeting",
                name: "Client Consultation",
                scenarios: &[ScenarioTemplate {
                    situation: "First discovery call: client describes scattered reporting across five tools",
                    goal: "Consultant captures requirements and proposes concrete next steps",
                    starter: "Our numbers live in five different tools and nobody trusts any of them.",
                    style: "inquisitive and synthesizing",
                }],
            },
        ],
    },
];
